//! Dock hardware capability: per-dock reset lines.
//!
//! Discovery arbitrates the shared bus with these lines: whichever dock
//! is left un-reset keeps the address it took from the broadcast. The
//! concrete pin plumbing (GPIO expander, port pins) is injected by the
//! board support layer.

use crate::dock::Dock;

/// Reset-line control for every dock, injected into the bootstrap.
///
/// Driving the line on a dock with nothing attached must be harmless;
/// the orchestrator resets empty docks to clean up stray state.
pub trait DockControl: Send {
    /// Drive the dock's reset line active (puppy held in reset).
    fn assert_reset(&mut self, dock: Dock);

    /// Release the dock's reset line (puppy boots its bootloader).
    fn release_reset(&mut self, dock: Dock);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingControl {
        log: Vec<(Dock, bool)>,
    }

    impl DockControl for RecordingControl {
        fn assert_reset(&mut self, dock: Dock) {
            self.log.push((dock, true));
        }

        fn release_reset(&mut self, dock: Dock) {
            self.log.push((dock, false));
        }
    }

    #[test]
    fn test_trait_is_object_safe() {
        let mut control: Box<dyn DockControl> = Box::new(RecordingControl::default());
        control.assert_reset(Dock::Bed);
        control.release_reset(Dock::Bed);
    }
}
