use crate::detection::BoundingBox;
use crate::emotion::{percent, Emotion};
use crate::history::HistoryLog;
use opencv::core::{Point, Rect, Scalar, Size};
use opencv::prelude::*;
use opencv::{core, highgui, imgproc};

/// User commands coming from the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Quit,
}

/// Which of the two capture controls is currently usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

impl Controls {
    pub fn for_capturing(capturing: bool) -> Self {
        Self {
            start_enabled: !capturing,
            stop_enabled: capturing,
        }
    }
}

/// Box and label drawn over the live frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlay {
    pub bounding_box: BoundingBox,
    pub emotion: Emotion,
    pub score: f32,
}

impl Overlay {
    pub fn caption(&self) -> String {
        format!("{} ({}%)", self.emotion.display_name(), percent(self.score))
    }
}

/// Everything the screen shows for one refresh.
pub struct View<'a, F> {
    /// `None` clears the video area.
    pub frame: Option<&'a F>,
    pub overlay: Option<Overlay>,
    pub current: Option<Emotion>,
    pub history: &'a HistoryLog,
    pub controls: Controls,
}

pub trait Screen<F> {
    fn render(&mut self, view: &View<'_, F>) -> anyhow::Result<()>;

    fn poll_command(&mut self) -> anyhow::Result<Option<Command>>;
}

const SIDEBAR_WIDTH: i32 = 260;
const VIDEO_WIDTH: i32 = 640;
const VIDEO_HEIGHT: i32 = 480;

fn bgr(b: f64, g: f64, r: f64) -> Scalar {
    Scalar::new(b, g, r, 0.0)
}

/// OpenCV highgui window with an emotion sidebar next to the video.
pub struct HighGuiScreen {
    window: String,
}

impl HighGuiScreen {
    pub fn new(window: &str) -> anyhow::Result<Self> {
        highgui::named_window_def(window)?;
        Ok(Self {
            window: window.to_owned(),
        })
    }

    fn video_area(&self, view: &View<'_, Mat>) -> anyhow::Result<Mat> {
        let mut video = match view.frame {
            Some(frame) => {
                let mut resized = Mat::default();
                imgproc::resize(
                    frame,
                    &mut resized,
                    Size::new(VIDEO_WIDTH, VIDEO_HEIGHT),
                    0.0,
                    0.0,
                    imgproc::INTER_LINEAR,
                )?;
                let size = frame.size()?;
                if let Some(overlay) = &view.overlay {
                    let sx = VIDEO_WIDTH as f64 / size.width.max(1) as f64;
                    let sy = VIDEO_HEIGHT as f64 / size.height.max(1) as f64;
                    draw_overlay(&mut resized, overlay, sx, sy)?;
                }
                resized
            }
            None => {
                let mut blank = Mat::new_rows_cols_with_default(
                    VIDEO_HEIGHT,
                    VIDEO_WIDTH,
                    core::CV_8UC3,
                    Scalar::all(0.0),
                )?;
                put_text(
                    &mut blank,
                    "Camera stopped",
                    Point::new(VIDEO_WIDTH / 2 - 110, VIDEO_HEIGHT / 2),
                    0.9,
                    bgr(180.0, 180.0, 180.0),
                    2,
                )?;
                blank
            }
        };
        draw_controls(&mut video, view.controls)?;
        Ok(video)
    }
}

impl Screen<Mat> for HighGuiScreen {
    fn render(&mut self, view: &View<'_, Mat>) -> anyhow::Result<()> {
        let sidebar = draw_sidebar(view.current, view.history)?;
        let video = self.video_area(view)?;
        let mut canvas = Mat::default();
        core::hconcat2(&sidebar, &video, &mut canvas)?;
        highgui::imshow(&self.window, &canvas)?;
        Ok(())
    }

    fn poll_command(&mut self) -> anyhow::Result<Option<Command>> {
        let key = highgui::poll_key()?;
        if highgui::get_window_property(&self.window, highgui::WND_PROP_VISIBLE)? < 1.0 {
            return Ok(Some(Command::Quit));
        }
        Ok(key_command(key))
    }
}

pub fn key_command(key: i32) -> Option<Command> {
    // poll_key reports -1 when nothing was pressed
    if key < 0 {
        return None;
    }
    match (key & 0xff) as u8 {
        b's' | b'S' => Some(Command::Start),
        b'x' | b'X' => Some(Command::Stop),
        b'q' | b'Q' | 27 => Some(Command::Quit),
        _ => None,
    }
}

fn put_text(
    image: &mut Mat,
    text: &str,
    origin: Point,
    scale: f64,
    color: Scalar,
    thickness: i32,
) -> opencv::Result<()> {
    imgproc::put_text(
        image,
        text,
        origin,
        imgproc::FONT_HERSHEY_SIMPLEX,
        scale,
        color,
        thickness,
        imgproc::LINE_AA,
        false,
    )
}

fn draw_overlay(image: &mut Mat, overlay: &Overlay, sx: f64, sy: f64) -> anyhow::Result<()> {
    let b = overlay.bounding_box;
    let rect = Rect::new(
        (b.x as f64 * sx) as i32,
        (b.y as f64 * sy) as i32,
        (b.width as f64 * sx) as i32,
        (b.height as f64 * sy) as i32,
    );
    imgproc::rectangle(image, rect, bgr(0.0, 255.0, 0.0), 2, imgproc::LINE_8, 0)?;
    let label_y = (rect.y - 10).max(20);
    put_text(
        image,
        &overlay.caption(),
        Point::new(rect.x, label_y),
        0.7,
        bgr(0.0, 0.0, 255.0),
        2,
    )?;
    Ok(())
}

fn draw_controls(image: &mut Mat, controls: Controls) -> anyhow::Result<()> {
    let enabled = bgr(220.0, 220.0, 220.0);
    let disabled = bgr(90.0, 90.0, 90.0);
    let shade = |on: bool| if on { enabled } else { disabled };
    let y = VIDEO_HEIGHT - 15;
    put_text(
        image,
        "[s] Start camera",
        Point::new(20, y),
        0.55,
        shade(controls.start_enabled),
        1,
    )?;
    put_text(
        image,
        "[x] Stop camera",
        Point::new(230, y),
        0.55,
        shade(controls.stop_enabled),
        1,
    )?;
    put_text(image, "[q] Quit", Point::new(440, y), 0.55, enabled, 1)?;
    Ok(())
}

fn draw_sidebar(current: Option<Emotion>, history: &HistoryLog) -> anyhow::Result<Mat> {
    let mut sidebar = Mat::new_rows_cols_with_default(
        VIDEO_HEIGHT,
        SIDEBAR_WIDTH,
        core::CV_8UC3,
        bgr(60.0, 50.0, 40.0),
    )?;
    let text = bgr(230.0, 230.0, 230.0);
    put_text(&mut sidebar, "Emotions", Point::new(60, 35), 0.8, text, 2)?;

    for (i, emotion) in Emotion::ALL.into_iter().enumerate() {
        let y = 70 + i as i32 * 28;
        if Some(emotion) == current {
            put_text(
                &mut sidebar,
                &format!("> {}", emotion.display_name()),
                Point::new(25, y),
                0.65,
                bgr(255.0, 160.0, 40.0),
                2,
            )?;
        } else {
            put_text(
                &mut sidebar,
                emotion.display_name(),
                Point::new(40, y),
                0.6,
                text,
                1,
            )?;
        }
    }

    let separator_y = 70 + 7 * 28 - 8;
    imgproc::line(
        &mut sidebar,
        Point::new(10, separator_y),
        Point::new(SIDEBAR_WIDTH - 10, separator_y),
        text,
        1,
        imgproc::LINE_8,
        0,
    )?;
    put_text(
        &mut sidebar,
        "History",
        Point::new(75, separator_y + 28),
        0.7,
        text,
        2,
    )?;

    let panel_top = separator_y + 40;
    let panel_height = VIDEO_HEIGHT - panel_top - 8;
    let panel = Rect::new(10, panel_top, SIDEBAR_WIDTH - 20, panel_height);
    imgproc::rectangle(
        &mut sidebar,
        panel,
        Scalar::all(255.0),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;
    for (i, line) in history.lines().iter().enumerate() {
        put_text(
            &mut sidebar,
            line,
            Point::new(16, panel_top + 16 + i as i32 * 14),
            0.42,
            Scalar::all(0.0),
            1,
        )?;
    }
    Ok(sidebar)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(key_command(-1), None);
        assert_eq!(key_command('s' as i32), Some(Command::Start));
        assert_eq!(key_command('x' as i32), Some(Command::Stop));
        assert_eq!(key_command('q' as i32), Some(Command::Quit));
        assert_eq!(key_command(27), Some(Command::Quit));
        assert_eq!(key_command('a' as i32), None);
    }

    #[test]
    fn controls_are_mutually_exclusive() {
        assert_eq!(
            Controls::for_capturing(false),
            Controls {
                start_enabled: true,
                stop_enabled: false
            }
        );
        let capturing = Controls::for_capturing(true);
        assert!(capturing.stop_enabled && !capturing.start_enabled);
    }

    #[test]
    fn overlay_caption_shows_percentage() {
        let overlay = Overlay {
            bounding_box: BoundingBox::default(),
            emotion: Emotion::Surprise,
            score: 0.91,
        };
        assert_eq!(overlay.caption(), "Surprise (91%)");
    }
}
