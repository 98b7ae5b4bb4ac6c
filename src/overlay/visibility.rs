use crate::viewer::OverlayStyle;

pub const DEFAULT_HYSTERESIS: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Hidden,
    Visible,
}

impl Visibility {
    pub const fn is_visible(self) -> bool {
        matches!(self, Self::Visible)
    }

    pub const fn style(self) -> OverlayStyle {
        match self {
            Self::Visible => OverlayStyle::SHOWN,
            Self::Hidden => OverlayStyle::HIDDEN,
        }
    }
}

/// Zoom threshold with a dead band around it so markers do not flicker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityPolicy {
    hysteresis: f64,
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self {
            hysteresis: DEFAULT_HYSTERESIS,
        }
    }
}

impl VisibilityPolicy {
    pub fn new(hysteresis: f64) -> Self {
        if hysteresis.is_finite() && hysteresis >= 0.0 {
            return Self { hysteresis };
        }
        tracing::warn!(hysteresis, "invalid hysteresis band; using an exact threshold");
        Self { hysteresis: 0.0 }
    }

    pub const fn hysteresis(&self) -> f64 {
        self.hysteresis
    }

    pub fn next_state(&self, current: Visibility, min_zoom: f64, zoom: f64) -> Visibility {
        let next = match current {
            Visibility::Hidden if zoom >= min_zoom + self.hysteresis => Visibility::Visible,
            Visibility::Visible if zoom < min_zoom - self.hysteresis => Visibility::Hidden,
            unchanged => unchanged,
        };
        if next != current {
            tracing::trace!(from = ?current, to = ?next, min_zoom, zoom, "visibility transition");
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep(policy: &VisibilityPolicy, min_zoom: f64, zooms: &[f64]) -> Vec<Visibility> {
        let mut state = Visibility::Hidden;
        zooms
            .iter()
            .map(|&zoom| {
                state = policy.next_state(state, min_zoom, zoom);
                state
            })
            .collect()
    }

    #[test]
    fn hidden_marker_waits_for_upper_edge_of_band() {
        let policy = VisibilityPolicy::new(0.1);
        assert_eq!(
            policy.next_state(Visibility::Hidden, 1.0, 1.05),
            Visibility::Hidden
        );
        assert_eq!(
            policy.next_state(Visibility::Hidden, 1.0, 1.11),
            Visibility::Visible
        );
    }

    #[test]
    fn visible_marker_holds_until_lower_edge_of_band() {
        let policy = VisibilityPolicy::new(0.1);
        let states = sweep(&policy, 1.0, &[1.2, 1.05, 0.95, 0.91, 1.0, 0.89]);
        use Visibility::*;
        assert_eq!(states, vec![Visible, Visible, Visible, Visible, Visible, Hidden]);
    }

    #[test]
    fn band_edges_are_inclusive_for_showing_and_holding() {
        let policy = VisibilityPolicy::new(0.1);
        assert_eq!(
            policy.next_state(Visibility::Hidden, 1.0, 1.1),
            Visibility::Visible
        );
        assert_eq!(
            policy.next_state(Visibility::Visible, 1.0, 0.9),
            Visibility::Visible
        );

        let quarter = VisibilityPolicy::new(0.25);
        assert_eq!(
            quarter.next_state(Visibility::Hidden, 0.5, 0.75),
            Visibility::Visible
        );
        assert_eq!(
            quarter.next_state(Visibility::Visible, 0.5, 0.25),
            Visibility::Visible
        );
        assert_eq!(
            quarter.next_state(Visibility::Visible, 0.5, 0.2499),
            Visibility::Hidden
        );
    }

    #[test]
    fn no_flicker_inside_band() {
        let policy = VisibilityPolicy::new(0.1);
        let from_hidden = sweep(&policy, 1.0, &[0.95, 1.05, 0.92, 1.08, 1.0]);
        assert!(from_hidden.iter().all(|state| *state == Visibility::Hidden));
    }

    #[test]
    fn zero_band_is_exact_threshold() {
        let policy = VisibilityPolicy::new(0.0);
        assert_eq!(
            policy.next_state(Visibility::Hidden, 0.5, 0.5),
            Visibility::Visible
        );
        assert_eq!(
            policy.next_state(Visibility::Visible, 0.5, 0.4999),
            Visibility::Hidden
        );
    }

    #[test]
    fn invalid_band_falls_back_to_zero() {
        assert_eq!(VisibilityPolicy::new(-0.2).hysteresis(), 0.0);
        assert_eq!(VisibilityPolicy::new(f64::NAN).hysteresis(), 0.0);
        assert_eq!(VisibilityPolicy::default().hysteresis(), DEFAULT_HYSTERESIS);
    }

    #[test]
    fn styles_toggle_pointer_interactivity() {
        assert!(Visibility::Visible.style().pointer_events);
        assert!(!Visibility::Hidden.style().pointer_events);
        assert!(!Visibility::Hidden.style().displayed);
    }
}
