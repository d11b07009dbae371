use emotion_sense::display::{Command, View};
use emotion_sense::{
    BoundingBox, CaptureError, CaptureHandle, CaptureSource, Detection, Emotion, EmotionDetector,
    EmotionScores, EmotionSession, Screen, SessionConfig, TickOutcome,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Frames carry the id of the handle that produced them.
#[derive(Default)]
struct Camera {
    next_handle: u32,
    log: Rc<RefCell<Vec<String>>>,
}

struct Handle {
    id: u32,
    log: Rc<RefCell<Vec<String>>>,
}

impl CaptureSource for Camera {
    type Handle = Handle;

    fn open(&mut self, _device_index: i32) -> Result<Handle, CaptureError> {
        self.next_handle += 1;
        self.log.borrow_mut().push(format!("open {}", self.next_handle));
        Ok(Handle {
            id: self.next_handle,
            log: self.log.clone(),
        })
    }
}

impl CaptureHandle for Handle {
    type Frame = u32;

    fn read_frame(&mut self) -> Option<u32> {
        Some(self.id)
    }

    fn close(self) {
        self.log.borrow_mut().push(format!("close {}", self.id));
    }
}

/// Sees whatever emotion is queued next, or fails when told to.
#[derive(Default)]
struct Scripted {
    next: Rc<RefCell<Option<(Emotion, f32)>>>,
    fail: Rc<RefCell<bool>>,
}

impl EmotionDetector<u32> for Scripted {
    fn detect_emotions(&mut self, _frame: &u32) -> anyhow::Result<Vec<Detection>> {
        if *self.fail.borrow() {
            anyhow::bail!("inference failed");
        }
        Ok(self
            .next
            .borrow()
            .map(|(emotion, score)| {
                vec![Detection::new(
                    BoundingBox::new(0, 0, 64, 64),
                    EmotionScores::single(emotion, score),
                )]
            })
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct Frames(Vec<Option<u32>>);

impl Screen<u32> for Frames {
    fn render(&mut self, view: &View<'_, u32>) -> anyhow::Result<()> {
        self.0.push(view.frame.copied());
        Ok(())
    }

    fn poll_command(&mut self) -> anyhow::Result<Option<Command>> {
        Ok(None)
    }
}

struct Rig {
    session: EmotionSession<Camera, Scripted, Frames>,
    log: Rc<RefCell<Vec<String>>>,
    next: Rc<RefCell<Option<(Emotion, f32)>>>,
    fail: Rc<RefCell<bool>>,
}

fn rig() -> Rig {
    let camera = Camera::default();
    let log = camera.log.clone();
    let detector = Scripted::default();
    let next = detector.next.clone();
    let fail = detector.fail.clone();
    Rig {
        session: EmotionSession::new(
            camera,
            detector,
            Frames::default(),
            &SessionConfig::default(),
        ),
        log,
        next,
        fail,
    }
}

#[test]
fn restart_uses_fresh_handle_and_keeps_history() {
    let mut rig = rig();
    let t0 = Instant::now();
    *rig.next.borrow_mut() = Some((Emotion::Happy, 0.9));

    rig.session.start().unwrap();
    rig.session.tick(t0).unwrap();
    rig.session.stop().unwrap();
    rig.session.start().unwrap();
    rig.session.tick(t0 + Duration::from_millis(50)).unwrap();

    assert_eq!(*rig.log.borrow(), vec!["open 1", "close 1", "open 2"]);
    assert_eq!(rig.session.screen().0, vec![Some(1), None, Some(2)]);
    assert_eq!(rig.session.aggregator().buffer().len(), 2);
    assert_eq!(rig.session.history().len(), 1);
    assert_eq!(rig.session.aggregator().current(), Some(Emotion::Happy));
}

#[test]
fn stop_takes_effect_before_next_tick() {
    let mut rig = rig();
    *rig.next.borrow_mut() = Some((Emotion::Sad, 0.8));
    rig.session.start().unwrap();
    rig.session.stop().unwrap();

    assert_eq!(rig.session.tick(Instant::now()).unwrap(), TickOutcome::Idle);
    assert!(rig.session.aggregator().buffer().is_empty());
}

#[test]
fn dwell_time_gates_history() {
    let mut rig = rig();
    let t0 = Instant::now();
    rig.session.start().unwrap();

    *rig.next.borrow_mut() = Some((Emotion::Happy, 0.8));
    rig.session.tick(t0).unwrap();

    *rig.next.borrow_mut() = Some((Emotion::Sad, 0.75));
    for ms in [250, 500, 750, 1000] {
        let outcome = rig.session.tick(t0 + Duration::from_millis(ms)).unwrap();
        assert!(outcome.event().is_none());
    }
    assert_eq!(rig.session.aggregator().current(), Some(Emotion::Happy));

    let outcome = rig.session.tick(t0 + Duration::from_millis(2100)).unwrap();
    assert_eq!(outcome.event().map(|e| e.emotion), Some(Emotion::Sad));

    let logged: Vec<Emotion> = rig.session.history().iter().map(|e| e.emotion).collect();
    assert_eq!(logged, vec![Emotion::Happy, Emotion::Sad]);
}

#[test]
fn history_is_capped_across_many_changes() {
    let mut rig = rig();
    let t0 = Instant::now();
    rig.session.start().unwrap();

    let mut t = t0;
    for round in 0..15 {
        let emotion = [Emotion::Angry, Emotion::Neutral][round % 2];
        *rig.next.borrow_mut() = Some((emotion, 0.95));
        // fill the window so the new label holds the majority
        for _ in 0..5 {
            t += Duration::from_millis(500);
            rig.session.tick(t).unwrap();
        }
        assert!(rig.session.history().len() <= 10);
    }
    assert_eq!(rig.session.history().len(), 10);
    assert_eq!(
        rig.session.history().latest().map(|e| e.emotion),
        Some(Emotion::Angry)
    );
}

#[test]
fn detector_failure_releases_camera() {
    let mut rig = rig();
    rig.session.start().unwrap();
    *rig.fail.borrow_mut() = true;

    assert!(rig.session.tick(Instant::now()).is_err());
    assert!(!rig.session.is_capturing());
    assert_eq!(*rig.log.borrow(), vec!["open 1", "close 1"]);
}
