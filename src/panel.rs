use std::rc::Rc;

use crate::poi::PoiRecord;

const NO_DESCRIPTION: &str = "No description.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelContent {
    pub title: String,
    pub html: String,
}

impl PanelContent {
    /// Descriptions are markup and are embedded as-is.
    pub fn for_poi(poi: &PoiRecord) -> Self {
        let description = poi
            .description
            .as_deref()
            .filter(|desc| !desc.is_empty())
            .unwrap_or(NO_DESCRIPTION);
        Self {
            title: poi.title.clone(),
            html: format!("<p>{description}</p>"),
        }
    }
}

pub trait DetailPanel {
    fn open(&self, content: PanelContent);
    fn close(&self);
}

pub type ClickCallback = Box<dyn FnMut(Option<&PoiRecord>)>;

/// Opens the panel for a clicked POI and closes it on background clicks.
pub fn click_callback(panel: Rc<dyn DetailPanel>) -> ClickCallback {
    Box::new(move |poi| match poi {
        Some(poi) => panel.open(PanelContent::for_poi(poi)),
        None => panel.close(),
    })
}
