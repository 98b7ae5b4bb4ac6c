use std::cell::RefCell;
use std::ffi::OsString;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::app::{bootstrap_app_runtime, open_poi_store, AppBootstrap, AppContext, AppServices};
use crate::coords::{haversine_distance_km, tile_address_from_image_point, tile_exists};
use crate::geometry::{ContainerSize, ImagePoint, ImageSize, PixelPoint};
use crate::panel::{click_callback, DetailPanel, PanelContent};
use crate::poi::{load_dataset, PoiDraft, PoiEdit, PoiEditor, PoiRecord};
use crate::viewer::headless::ClickDispatch;
use crate::viewer::{HeadlessViewer, ViewerBackend};

/// Points-of-interest overlays on a headless deep-zoom viewer
#[derive(Parser, Debug)]
#[command(name = "poimap", version, arg_required_else_help = true)]
struct Cli {
    /// Read settings from this file instead of the XDG config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Place the POIs on a headless viewer and print where each one ends up
    Render {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Click a screen pixel and print the detail panel that opens
    Click {
        #[arg(allow_negative_numbers = true)]
        px: f64,
        #[arg(allow_negative_numbers = true)]
        py: f64,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Right-click an image point, confirm the new POI in the terminal and save it
    Create {
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Print the POIs saved in local storage
    List,
    /// Print the deep-zoom tile holding an image point
    Tile {
        x: f64,
        y: f64,
        #[command(flatten)]
        image: ImageArgs,
        /// Image zoom (screen pixels per image pixel)
        #[arg(long, default_value_t = 1.0)]
        zoom: f64,
        /// Base path or URL of the pyramid (`<name>_files` directory)
        #[arg(long)]
        dzi: Option<String>,
    },
    /// Great-circle distance in kilometres
    Distance {
        #[arg(allow_negative_numbers = true)]
        lat1: f64,
        #[arg(allow_negative_numbers = true)]
        lon1: f64,
        #[arg(allow_negative_numbers = true)]
        lat2: f64,
        #[arg(allow_negative_numbers = true)]
        lon2: f64,
    },
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct ImageArgs {
    /// Image size in pixels, as <width>x<height>
    #[arg(long, value_parser = parse_image_size)]
    size: Option<ImageSize>,

    /// Read the image size from this file
    #[arg(long)]
    image: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct SessionArgs {
    /// POI dataset (JSON array); defaults to `dataset_path` from the config
    #[arg(long)]
    pois: Option<PathBuf>,

    #[command(flatten)]
    image: ImageArgs,

    /// Image zoom to apply once the image is open
    #[arg(long)]
    zoom: Option<f64>,

    /// Viewer size in screen pixels
    #[arg(long, default_value = "1024x768", value_parser = parse_container_size)]
    container: ContainerSize,
}

/// Parses `args` (program name first) and runs the selected command.
pub fn handle_commands<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => {
            err.print()?;
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    tracing::debug!(?cli, "parsed command line");

    let config = cli.config.as_deref();
    match cli.command {
        Command::Render { session } => run_render(config, &session),
        Command::Click { px, py, session } => run_click(config, &session, PixelPoint::new(px, py)),
        Command::Create { x, y, session } => run_create(config, &session, ImagePoint::new(x, y)),
        Command::List => run_list(config),
        Command::Tile {
            x,
            y,
            image,
            zoom,
            dzi,
        } => run_tile(&image, ImagePoint::new(x, y), zoom, dzi.as_deref()),
        Command::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
        } => {
            println!("{:.3} km", haversine_distance_km(lat1, lon1, lat2, lon2));
            Ok(())
        }
    }
}

/// Prints panel changes to stdout and remembers the last opened content.
#[derive(Default)]
pub struct ConsolePanel {
    current: RefCell<Option<PanelContent>>,
}

impl ConsolePanel {
    pub fn current(&self) -> Option<PanelContent> {
        self.current.borrow().clone()
    }
}

impl DetailPanel for ConsolePanel {
    fn open(&self, content: PanelContent) {
        println!("panel: {}\n  {}", content.title, content.html);
        *self.current.borrow_mut() = Some(content);
    }

    fn close(&self) {
        if self.current.borrow_mut().take().is_some() {
            println!("panel closed");
        }
    }
}

/// Line-based confirm prompt. End of input cancels.
pub struct TerminalEditor<R, W> {
    input: R,
    output: W,
}

impl TerminalEditor<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalEditor<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.output, "{label}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn ask(&mut self, draft: &PoiDraft) -> io::Result<Option<PoiEdit>> {
        let record = &draft.record;
        writeln!(self.output, "New POI {}", record.id)?;
        writeln!(self.output, "  location: {}", record.tooltip())?;
        if let Some(tile) = &record.tile {
            writeln!(self.output, "  tile: {}", tile.path())?;
        }

        let Some(title) = self.prompt(&format!("Title [{}]: ", record.title))? else {
            return Ok(None);
        };
        let description_default = record.description.as_deref().unwrap_or_default();
        let Some(description) = self.prompt(&format!("Description [{description_default}]: "))?
        else {
            return Ok(None);
        };
        let Some(answer) = self.prompt("Save? [Y/n] ")? else {
            return Ok(None);
        };
        if answer.trim().eq_ignore_ascii_case("n") || answer.trim().eq_ignore_ascii_case("no") {
            return Ok(None);
        }
        Ok(Some(PoiEdit { title, description }))
    }
}

impl<R: BufRead, W: Write> PoiEditor for TerminalEditor<R, W> {
    fn confirm(&mut self, draft: &PoiDraft) -> Option<PoiEdit> {
        match self.ask(draft) {
            Ok(edit) => edit,
            Err(err) => {
                tracing::warn!(?err, "terminal prompt failed; cancelling POI creation");
                None
            }
        }
    }
}

struct Session {
    viewer: Rc<HeadlessViewer>,
    context: AppContext,
    panel: Rc<ConsolePanel>,
}

fn open_session(
    config: Option<&Path>,
    args: &SessionArgs,
    editor: Box<dyn PoiEditor>,
) -> Result<Session> {
    let bootstrap = bootstrap_app_runtime(config);
    let image_size = args.image.resolve()?;

    let viewer = Rc::new(HeadlessViewer::new(args.container));
    let panel = Rc::new(ConsolePanel::default());
    let services = AppServices {
        on_click: click_callback(panel.clone()),
        editor,
        store: open_poi_store(&bootstrap.config),
        notifier: bootstrap.notifier(),
    };
    let backend: Rc<dyn ViewerBackend> = viewer.clone();
    let context = AppContext::new(backend, bootstrap.settings, bootstrap.defaults, services);

    let records = dataset_records(args.pois.as_deref(), &bootstrap)?;
    let report = context.dataset_loaded(records);
    tracing::info!(
        accepted = report.accepted,
        rejected = report.rejected,
        "dataset ready"
    );

    viewer.open(image_size);
    if let Some(zoom) = args.zoom {
        viewer.set_image_zoom(zoom);
    }

    Ok(Session {
        viewer,
        context,
        panel,
    })
}

fn dataset_records(pois: Option<&Path>, bootstrap: &AppBootstrap) -> Result<Vec<PoiRecord>> {
    let path = pois
        .map(Path::to_path_buf)
        .or_else(|| bootstrap.config.dataset_path.clone());
    let Some(path) = path else {
        tracing::warn!("no POI dataset given; only saved POIs will be shown");
        return Ok(Vec::new());
    };
    let load = load_dataset(&path, bootstrap.defaults)
        .with_context(|| format!("failed to load POI dataset {}", path.display()))?;
    Ok(load.records)
}

fn run_render(config: Option<&Path>, args: &SessionArgs) -> Result<()> {
    let session = open_session(config, args, Box::new(TerminalEditor::stdio()))?;
    print_overlays(&session);
    Ok(())
}

fn print_overlays(session: &Session) {
    let manager = session.context.manager();
    for poi in manager.pois() {
        let placement = manager
            .element_for(&poi.id)
            .and_then(|element| session.viewer.element(element))
            .and_then(|snapshot| snapshot.location)
            .map(|location| session.viewer.viewport_to_pixel(location));
        let visibility = manager.visibility(&poi.id).unwrap_or_default();
        match placement {
            Some(pixel) => println!(
                "{}\t{:?}\t{:.1},{:.1}\t{}",
                poi.id, visibility, pixel.x, pixel.y, poi.title
            ),
            None => println!("{}\tnot rendered\t-\t{}", poi.id, poi.title),
        }
    }
}

fn run_click(config: Option<&Path>, args: &SessionArgs, pixel: PixelPoint) -> Result<()> {
    let session = open_session(config, args, Box::new(TerminalEditor::stdio()))?;
    match session.viewer.click(pixel) {
        ClickDispatch::Overlay(element) => {
            let id = session
                .context
                .manager()
                .poi_for_element(element)
                .map(|poi| poi.id)
                .unwrap_or_default();
            println!("clicked POI {id}");
        }
        ClickDispatch::Canvas => println!("clicked background"),
    }
    if session.panel.current().is_none() {
        println!("panel is closed");
    }
    Ok(())
}

fn run_create(config: Option<&Path>, args: &SessionArgs, point: ImagePoint) -> Result<()> {
    let session = open_session(config, args, Box::new(TerminalEditor::stdio()))?;
    let manager = session.context.manager();
    let before = manager.len();

    let pixel = session.viewer.image_to_pixel(point);
    session.viewer.context_menu(pixel);

    if manager.len() == before {
        println!("no POI created");
        return Ok(());
    }
    if let Some(created) = manager.pois().last() {
        println!("created {} \"{}\"", created.id, created.title);
    }
    Ok(())
}

fn run_list(config: Option<&Path>) -> Result<()> {
    let bootstrap = bootstrap_app_runtime(config);
    let store = open_poi_store(&bootstrap.config);
    let load = store
        .load(bootstrap.defaults)
        .context("failed to read saved POIs")?;
    if load.records.is_empty() {
        println!("no saved POIs");
    }
    for record in &load.records {
        println!("{}\t{}", record.id, record.tooltip());
    }
    if load.skipped > 0 {
        println!("({} unreadable entries skipped)", load.skipped);
    }
    Ok(())
}

fn run_tile(image: &ImageArgs, point: ImagePoint, zoom: f64, dzi: Option<&str>) -> Result<()> {
    let size = image.resolve()?;
    if !size.contains(point) {
        bail!(
            "point ({}, {}) is outside the {}x{} image",
            point.x,
            point.y,
            size.width,
            size.height
        );
    }
    let tile = tile_address_from_image_point(point, size, zoom);

    println!(
        "level {} of {}x{} tiles, tile {} at offset {},{}",
        tile.level,
        tile.tiles_wide,
        tile.tiles_high,
        tile.path(),
        tile.tile_x,
        tile.tile_y
    );
    if let Some(base) = dzi {
        println!("url: {}", tile.url(base));
        println!("on disk: {}", tile_exists(Path::new(base), &tile));
    }
    Ok(())
}

impl ImageArgs {
    fn resolve(&self) -> Result<ImageSize> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        if let Some(path) = &self.image {
            let (width, height) = image::image_dimensions(path).with_context(|| {
                format!("failed to read image dimensions from {}", path.display())
            })?;
            return Ok(ImageSize::new(width, height));
        }
        bail!("an image size is required: pass --size <WxH> or --image <file>")
    }
}

fn parse_size(text: &str) -> Result<(u32, u32), String> {
    let (width, height) = text
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected <width>x<height>, got `{text}`"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in `{text}`"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in `{text}`"))?;
    if width == 0 || height == 0 {
        return Err(format!("size `{text}` must be non-zero"));
    }
    Ok((width, height))
}

fn parse_image_size(text: &str) -> Result<ImageSize, String> {
    parse_size(text).map(|(width, height)| ImageSize::new(width, height))
}

fn parse_container_size(text: &str) -> Result<ContainerSize, String> {
    parse_size(text).map(|(width, height)| ContainerSize::new(f64::from(width), f64::from(height)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poi::PoiLocation;
    use std::io::Cursor;

    fn parse(list: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(list)
    }

    fn draft() -> PoiDraft {
        PoiDraft {
            record: PoiRecord::new(
                "poi_1",
                PoiLocation::Geographic { lat: 1.0, lon: 2.0 },
                "POI 1.00°, 2.00°",
            )
            .with_description("Created at tile 0/0_0.jpg"),
        }
    }

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_size_accepts_width_by_height() {
        assert_eq!(parse_size("4096x2048").unwrap(), (4096, 2048));
        assert_eq!(parse_size("10X20").unwrap(), (10, 20));
        assert!(parse_size("4096").is_err());
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("ax10").is_err());
    }

    #[test]
    fn click_takes_negative_pixels_and_session_flags() {
        let cli = parse(&[
            "poimap", "click", "--size", "100x100", "12", "-5.5", "--zoom", "2",
        ])
        .unwrap();
        let Command::Click { px, py, session } = cli.command else {
            panic!("expected click");
        };
        assert_eq!((px, py), (12.0, -5.5));
        assert_eq!(session.zoom, Some(2.0));
        assert_eq!(session.image.size, Some(ImageSize::new(100, 100)));
        assert_eq!(session.container, ContainerSize::new(1024.0, 768.0));
    }

    #[test]
    fn malformed_command_lines_are_rejected() {
        let base = ["poimap", "create", "10", "20", "--size", "64x32"];
        assert!(parse(&base).is_ok());

        let mut unknown_flag = base.to_vec();
        unknown_flag.push("--verbose");
        assert!(parse(&unknown_flag).is_err());

        let mut extra_positional = base.to_vec();
        extra_positional.push("30");
        assert!(parse(&extra_positional).is_err());

        assert!(parse(&["poimap", "create", "10", "20", "--size"]).is_err());
        assert!(parse(&["poimap", "create", "10", "--size", "64x32"]).is_err());
        assert!(parse(&["poimap", "tile", "1", "1"]).is_err());
        assert!(parse(&["poimap", "tile", "1", "1", "--size", "8x8", "--image", "a.png"]).is_err());
        assert!(parse(&["poimap", "render", "--size", "0x8"]).is_err());
    }

    #[test]
    fn config_flag_is_accepted_after_the_command() {
        let cli = parse(&["poimap", "list", "--config", "/tmp/poimap.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/poimap.json")));
        assert!(matches!(cli.command, Command::List));
    }

    #[test]
    fn terminal_editor_keeps_defaults_on_blank_lines() {
        let mut output = Vec::new();
        let edit = {
            let mut editor = TerminalEditor::new(Cursor::new("\n\ny\n"), &mut output);
            editor.confirm(&draft())
        }
        .expect("blank answers should confirm");
        let record = draft().finish(edit);
        assert_eq!(record.title, "POI 1.00°, 2.00°");

        let transcript = String::from_utf8(output).unwrap();
        assert!(transcript.contains("Title [POI 1.00°, 2.00°]: "));
        assert!(transcript.contains("Description [Created at tile 0/0_0.jpg]: "));
    }

    #[test]
    fn terminal_editor_takes_typed_values_and_can_cancel() {
        let mut editor = TerminalEditor::new(Cursor::new("Crater\nFresh\n\n"), Vec::new());
        let edit = editor.confirm(&draft()).expect("should confirm");
        assert_eq!(edit.title, "Crater");
        assert_eq!(edit.description, "Fresh");

        let mut declined = TerminalEditor::new(Cursor::new("a\nb\nn\n"), Vec::new());
        assert!(declined.confirm(&draft()).is_none());

        let mut closed = TerminalEditor::new(Cursor::new("only title\n"), Vec::new());
        assert!(closed.confirm(&draft()).is_none());
    }

    #[test]
    fn console_panel_tracks_open_content() {
        let panel = ConsolePanel::default();
        panel.open(PanelContent {
            title: "T".to_string(),
            html: "<p>x</p>".to_string(),
        });
        assert_eq!(panel.current().unwrap().title, "T");
        panel.close();
        assert!(panel.current().is_none());
    }

    #[test]
    fn commands_run_end_to_end() {
        let dir = std::env::temp_dir().join("poimap-cli-test");
        std::fs::create_dir_all(&dir).unwrap();
        let dataset = dir.join("pois.json");
        std::fs::write(
            &dataset,
            r#"[{"id": "a", "lat": 10, "lon": 20, "title": "A"}, {"id": "bad", "lat": "x"}]"#,
        )
        .unwrap();
        let config = dir.join("config.json");
        std::fs::write(
            &config,
            format!(
                r#"{{"storage_path": {:?}, "notifications": false}}"#,
                dir.join("storage.json")
            ),
        )
        .unwrap();
        let common = [
            "--pois",
            dataset.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
            "--size",
            "2048x1024",
        ];

        let mut render = vec!["poimap", "render"];
        render.extend(common);
        handle_commands(render).expect("render should succeed");

        let mut click = vec!["poimap", "click", "5", "5"];
        click.extend(common);
        handle_commands(click).expect("click should succeed");

        handle_commands(["poimap", "list", "--config", config.to_str().unwrap()])
            .expect("list should succeed");
        handle_commands(["poimap", "tile", "100", "100", "--size", "4096x2048"])
            .expect("tile should succeed");
        handle_commands(["poimap", "distance", "0", "0", "-10", "90"])
            .expect("distance should succeed");
        handle_commands(["poimap", "help"]).expect("help should print");
        assert!(handle_commands(["poimap", "bogus"]).is_err());

        let _ = std::fs::remove_dir_all(dir);
    }
}
