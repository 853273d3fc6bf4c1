//! Door access state machine.
//!
//! One iteration reads a frame, runs recognition on every other iteration,
//! drives the indicator and lock from the decision, then services the
//! enroll and quit switches. Hardware, camera, analyzer, store and sleeping
//! are all injected so the loop runs unchanged against fakes.

use crate::shutdown::ShutdownFlag;
use crate::store::{person_name, FaceStore};
use facegate_core::{
    recognize, AccessDecision, EnrollmentError, FaceAnalyzer, IdentityIndex, IndexLoadError,
    LabeledImage, RecognitionError,
};
use facegate_hw::{AccessLines, DigitalLine, FrameSource, GpioError};
use image::GrayImage;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Name given to faces enrolled with the button.
pub const ENROLLED_NAME: &str = "Registered User";

/// Longest single sleep; shutdown is checked between slices.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("gpio error: {0}")]
    Gpio(#[from] GpioError),
    #[error("recognition error: {0}")]
    Recognition(#[from] RecognitionError),
    #[error("enrollment error: {0}")]
    Enrollment(#[from] EnrollmentError),
    #[error("failed to load known faces: {0}")]
    IndexLoad(#[from] IndexLoadError),
    #[error("interrupted by signal")]
    Interrupted,
}

impl ControllerError {
    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ControllerError::Interrupted => -1,
            _ => -2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Scanning,
    Enrolling,
    Terminated,
}

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub lock_hold: Duration,
    pub debounce_poll: Duration,
}

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Blocks the calling thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct AccessController<C, A, L, S, P = ThreadSleeper> {
    camera: C,
    analyzer: A,
    lines: AccessLines<L>,
    store: S,
    sleeper: P,
    timing: Timing,
    shutdown: ShutdownFlag,
    index: IdentityIndex,
    state: ControllerState,
    process_this_frame: bool,
}

impl<C, A, L, S, P> AccessController<C, A, L, S, P>
where
    C: FrameSource,
    A: FaceAnalyzer,
    L: DigitalLine,
    S: FaceStore,
    P: Sleeper,
{
    pub fn new(
        camera: C,
        analyzer: A,
        lines: AccessLines<L>,
        store: S,
        sleeper: P,
        timing: Timing,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            camera,
            analyzer,
            lines,
            store,
            sleeper,
            timing,
            shutdown,
            index: IdentityIndex::new(),
            state: ControllerState::Scanning,
            process_this_frame: true,
        }
    }

    /// Build the identity index from `enrolled`, then configure the GPIO lines.
    pub fn start<I>(&mut self, enrolled: I) -> Result<usize, ControllerError>
    where
        I: IntoIterator<Item = LabeledImage>,
    {
        let loaded = self.index.load_all(&mut self.analyzer, enrolled)?;
        self.lines.configure()?;
        self.state = ControllerState::Scanning;
        tracing::info!(known_faces = loaded, "controller ready");
        Ok(loaded)
    }

    /// Run until the quit switch is pressed, a fatal error occurs, or a
    /// signal arrives. The lock and indicator are released on every exit.
    pub fn run(&mut self) -> Result<(), ControllerError> {
        let result = {
            let span = tracing::info_span!("scanning");
            let _entered = span.enter();
            tracing::info!(known_faces = self.index.len(), "scanning for faces");
            self.scan()
        };

        let span = tracing::info_span!("shutdown");
        let _entered = span.enter();
        self.release_outputs();
        result
    }

    fn scan(&mut self) -> Result<(), ControllerError> {
        while self.step()? != ControllerState::Terminated {}
        Ok(())
    }

    /// One loop iteration. Returns the state after it.
    pub fn step(&mut self) -> Result<ControllerState, ControllerError> {
        if self.state == ControllerState::Terminated {
            return Ok(self.state);
        }
        self.check_shutdown()?;

        let frame = self.camera.next_frame();
        let process = self.process_this_frame;
        self.process_this_frame = !process;

        if process {
            if let Some(frame) = &frame {
                let decision = recognize(&mut self.analyzer, &frame.image, &self.index)?;
                self.actuate(decision)?;
            }
        }

        if self.lines.enroll_requested()? {
            if let Some(frame) = &frame {
                self.enroll(&frame.image)?;
            }
        }

        if self.lines.quit_requested()? && frame.is_some() {
            tracing::info!("quit switch pressed");
            self.state = ControllerState::Terminated;
        }

        Ok(self.state)
    }

    fn actuate(&mut self, decision: AccessDecision) -> Result<(), ControllerError> {
        match decision {
            AccessDecision::Granted(label) => {
                tracing::info!(person = person_name(&label), %label, "access provided");
                self.lines.indicator.write(true)?;
                if self.lines.door_open()? {
                    tracing::debug!("door already open, lock left alone");
                } else {
                    self.pulse_lock()?;
                }
            }
            AccessDecision::Denied => {
                tracing::info!("access denied");
                self.lines.indicator.write(false)?;
            }
        }
        Ok(())
    }

    /// Assert the lock for one hold period. The release write always
    /// happens, even when a signal cuts the hold short.
    fn pulse_lock(&mut self) -> Result<(), ControllerError> {
        self.lines.lock.write(true)?;
        let completed = self.hold(self.timing.lock_hold);
        self.lines.lock.write(false)?;
        if completed {
            Ok(())
        } else {
            Err(ControllerError::Interrupted)
        }
    }

    fn enroll(&mut self, image: &GrayImage) -> Result<(), ControllerError> {
        self.state = ControllerState::Enrolling;
        let span = tracing::info_span!("enrolling");
        let _entered = span.enter();
        tracing::info!("starting to add you to database");

        let label = format!("{ENROLLED_NAME}-{}", Uuid::new_v4());
        if let Err(e) = self.store.persist(&label, image) {
            tracing::error!(error = %e, "enrollment image not saved");
        }
        self.index.enroll(&mut self.analyzer, image, &label)?;

        while self.lines.enroll_requested()? {
            if !self.hold(self.timing.debounce_poll) {
                return Err(ControllerError::Interrupted);
            }
        }
        tracing::debug!("enroll button released");

        self.state = ControllerState::Scanning;
        Ok(())
    }

    /// Sleep for `duration` in slices. `false` if shutdown was requested.
    fn hold(&mut self, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.shutdown.is_requested() {
                return false;
            }
            let slice = remaining.min(SLEEP_SLICE);
            self.sleeper.sleep(slice);
            remaining -= slice;
        }
        !self.shutdown.is_requested()
    }

    fn check_shutdown(&self) -> Result<(), ControllerError> {
        if self.shutdown.is_requested() {
            Err(ControllerError::Interrupted)
        } else {
            Ok(())
        }
    }

    fn release_outputs(&mut self) {
        if let Err(e) = self.lines.lock.write(false) {
            tracing::warn!(error = %e, "failed to release lock");
        }
        if let Err(e) = self.lines.indicator.write(false) {
            tracing::warn!(error = %e, "failed to turn indicator off");
        }
    }
}
