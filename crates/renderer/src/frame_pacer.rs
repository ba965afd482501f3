//! Frame pacing and swapchain invalidation handling.
//!
//! [`FramePacer`] drives one iteration of the render loop against a
//! [`FrameBackend`]:
//!
//! ```text
//! 1. wait on the slot's in-flight fence
//! 2. acquire an image            -- out of date: rebuild, skip the frame
//! 3. wait on the fence of any other slot still rendering to that image
//! 4. write the image's uniforms
//! 5. reset the fence and submit  -- waits image-available, signals render-finished
//! 6. present                     -- out of date / suboptimal / resized: rebuild
//! 7. advance the slot index modulo the in-flight count
//! ```
//!
//! The GPU never holds more than `frames_in_flight` frames, and no slot's
//! semaphores or fence are reused before that fence has been waited on.
//! Stale and suboptimal swapchains are handled here and never surface as
//! errors. While the surface has zero area a rebuild is deferred: the resize
//! flag stays set and the rebuild runs on the first frame after the window
//! is restored.

use tracing::{debug, warn};

use lumen_rhi::RhiResult;
use lumen_rhi::swapchain::{AcquireOutcome, PresentOutcome};

/// GPU operations the pacer sequences.
///
/// `slot` is always below the pacer's in-flight count and `image_index`
/// below the image count last reported by the backend.
pub trait FrameBackend {
    /// Blocks until the fence of `slot` is signaled.
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Acquires the next image, signaling the slot's image-available semaphore.
    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome>;

    /// Writes per-image data (uniforms) before the image's commands run.
    fn prepare_image(&mut self, image_index: u32) -> RhiResult<()>;

    /// Resets the slot's fence and submits the image's command buffer.
    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome>;

    /// Rebuilds the swapchain and everything bound to it, returning the new
    /// image count.
    fn rebuild_swapchain(&mut self) -> RhiResult<usize>;

    /// Whether the surface currently has a nonzero size.
    fn surface_ready(&self) -> bool {
        true
    }
}

/// What one call to [`FramePacer::draw_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image_index: u32, rebuilt: bool },
    /// The swapchain was stale at acquire; nothing was submitted.
    Skipped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_presented: u64,
    pub frames_skipped: u64,
    pub rebuilds: u64,
    /// Rebuilds postponed because the window was minimized.
    pub rebuilds_deferred: u64,
}

/// Bounded frames-in-flight state machine.
#[derive(Debug)]
pub struct FramePacer {
    frames_in_flight: usize,
    current_slot: usize,
    /// Slot whose submission last rendered to each swapchain image.
    images_in_flight: Vec<Option<usize>>,
    resize_requested: bool,
    stats: FrameStats,
}

impl FramePacer {
    /// `frames_in_flight` is clamped to at least one.
    pub fn new(frames_in_flight: usize, image_count: usize) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            current_slot: 0,
            images_in_flight: vec![None; image_count],
            resize_requested: false,
            stats: FrameStats::default(),
        }
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Flags a rebuild after the next present. Called on window resize.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    #[inline]
    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    /// Runs one iteration of the frame loop.
    ///
    /// # Errors
    ///
    /// Any backend error other than the stale/suboptimal outcomes, all of
    /// which are fatal.
    pub fn draw_frame<B: FrameBackend>(&mut self, backend: &mut B) -> RhiResult<FrameOutcome> {
        let slot = self.current_slot;
        backend.wait_for_slot(slot)?;

        let (image_index, suboptimal) = match backend.acquire_image(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                warn!("Swapchain out of date at acquire, skipping frame");
                self.rebuild_when_ready(backend)?;
                self.stats.frames_skipped += 1;
                return Ok(FrameOutcome::Skipped);
            }
        };
        if suboptimal {
            debug!("Acquired suboptimal image {}, rebuilding after present", image_index);
        }

        self.claim_image(backend, slot, image_index)?;

        backend.prepare_image(image_index)?;
        backend.submit(slot, image_index)?;
        let presented = backend.present(slot, image_index)?;

        self.stats.frames_presented += 1;
        self.current_slot = (slot + 1) % self.frames_in_flight;

        let mut rebuilt = false;
        if presented.needs_rebuild() || suboptimal || self.resize_requested {
            match presented {
                PresentOutcome::OutOfDate => warn!("Swapchain out of date at present"),
                PresentOutcome::Suboptimal => warn!("Swapchain suboptimal at present"),
                PresentOutcome::Presented => {}
            }
            rebuilt = self.rebuild_when_ready(backend)?;
        }

        Ok(FrameOutcome::Presented {
            image_index,
            rebuilt,
        })
    }

    /// Waits out any other slot still rendering to `image_index`, then records
    /// `slot` as its owner.
    fn claim_image<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        slot: usize,
        image_index: u32,
    ) -> RhiResult<()> {
        let index = image_index as usize;
        if index >= self.images_in_flight.len() {
            self.images_in_flight.resize(index + 1, None);
        }

        if let Some(owner) = self.images_in_flight[index]
            && owner != slot
        {
            debug!("Image {} still owned by slot {}, waiting", image_index, owner);
            backend.wait_for_slot(owner)?;
        }
        self.images_in_flight[index] = Some(slot);
        Ok(())
    }

    /// Rebuilds now, or keeps the resize flag set while the surface has zero
    /// area. Returns whether a rebuild happened.
    fn rebuild_when_ready<B: FrameBackend>(&mut self, backend: &mut B) -> RhiResult<bool> {
        if !backend.surface_ready() {
            self.resize_requested = true;
            self.stats.rebuilds_deferred += 1;
            debug!("Surface has zero area, deferring swapchain rebuild");
            return Ok(false);
        }
        self.rebuild(backend)?;
        Ok(true)
    }

    fn rebuild<B: FrameBackend>(&mut self, backend: &mut B) -> RhiResult<()> {
        let image_count = backend.rebuild_swapchain()?;
        self.images_in_flight = vec![None; image_count];
        self.resize_requested = false;
        self.stats.rebuilds += 1;
        debug!(
            "Swapchain rebuild #{} ({} images) after {} presented frame(s)",
            self.stats.rebuilds, image_count, self.stats.frames_presented
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use lumen_rhi::RhiError;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Prepare(u32),
        Submit(usize, u32),
        Present(usize, u32),
        Rebuild,
    }

    /// Records calls and models each slot's fence as "pending" between a
    /// submit and the next wait on it.
    struct ScriptedBackend {
        calls: Vec<Call>,
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentOutcome>,
        pending: Vec<bool>,
        image_count: usize,
        next_image: u32,
        minimized: bool,
    }

    impl ScriptedBackend {
        fn new(slots: usize, image_count: usize) -> Self {
            Self {
                calls: Vec::new(),
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                pending: vec![false; slots],
                image_count,
                next_image: 0,
                minimized: false,
            }
        }

        fn count(&self, call: fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| call(c)).count()
        }
    }

    impl FrameBackend for ScriptedBackend {
        fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
            self.calls.push(Call::Wait(slot));
            self.pending[slot] = false;
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
            self.calls.push(Call::Acquire(slot));
            Ok(self.acquires.pop_front().unwrap_or_else(|| {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count as u32;
                AcquireOutcome::Acquired {
                    image_index,
                    suboptimal: false,
                }
            }))
        }

        fn prepare_image(&mut self, image_index: u32) -> RhiResult<()> {
            self.calls.push(Call::Prepare(image_index));
            Ok(())
        }

        fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
            assert!(
                !self.pending[slot],
                "slot {slot} resubmitted before its fence was waited on"
            );
            self.pending[slot] = true;
            self.calls.push(Call::Submit(slot, image_index));
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(self
                .presents
                .pop_front()
                .unwrap_or(PresentOutcome::Presented))
        }

        fn rebuild_swapchain(&mut self) -> RhiResult<usize> {
            self.calls.push(Call::Rebuild);
            assert!(!self.minimized, "rebuilt while the surface had zero area");
            self.next_image = 0;
            Ok(self.image_count)
        }

        fn surface_ready(&self) -> bool {
            !self.minimized
        }
    }

    #[test]
    fn test_slot_fence_waited_before_reuse() {
        let frames_in_flight = 2;
        let mut pacer = FramePacer::new(frames_in_flight, 3);
        let mut backend = ScriptedBackend::new(frames_in_flight, 3);

        for _ in 0..=frames_in_flight {
            pacer.draw_frame(&mut backend).unwrap();
        }

        let first_submit = backend
            .calls
            .iter()
            .position(|c| *c == Call::Submit(0, 0))
            .unwrap();
        let second_submit = backend
            .calls
            .iter()
            .rposition(|c| matches!(c, Call::Submit(0, _)))
            .unwrap();
        assert!(first_submit < second_submit);
        assert!(
            backend.calls[first_submit..second_submit].contains(&Call::Wait(0)),
            "{:?}",
            backend.calls
        );
        assert_eq!(pacer.stats().frames_presented, 3);
        assert_eq!(pacer.current_slot(), 1);
    }

    #[test]
    fn test_steady_state_call_order() {
        let mut pacer = FramePacer::new(2, 3);
        let mut backend = ScriptedBackend::new(2, 3);

        let outcome = pacer.draw_frame(&mut backend).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                image_index: 0,
                rebuilt: false
            }
        );
        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Prepare(0),
                Call::Submit(0, 0),
                Call::Present(0, 0),
            ]
        );
    }

    #[test]
    fn test_out_of_date_acquire_rebuilds_once_and_skips() {
        let mut pacer = FramePacer::new(2, 3);
        let mut backend = ScriptedBackend::new(2, 3);
        backend.acquires.push_back(AcquireOutcome::OutOfDate);

        let outcome = pacer.draw_frame(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::Skipped);
        assert_eq!(
            backend.calls,
            vec![Call::Wait(0), Call::Acquire(0), Call::Rebuild]
        );
        assert_eq!(backend.count(|c| matches!(c, Call::Rebuild)), 1);
        assert_eq!(pacer.stats().frames_skipped, 1);
        assert_eq!(pacer.stats().rebuilds, 1);
        // The skipped frame does not consume the slot
        assert_eq!(pacer.current_slot(), 0);

        pacer.draw_frame(&mut backend).unwrap();
        assert_eq!(backend.count(|c| matches!(c, Call::Submit(..))), 1);
    }

    #[test]
    fn test_suboptimal_acquire_presents_then_rebuilds() {
        let mut pacer = FramePacer::new(2, 3);
        let mut backend = ScriptedBackend::new(2, 3);
        backend.acquires.push_back(AcquireOutcome::Acquired {
            image_index: 1,
            suboptimal: true,
        });

        let outcome = pacer.draw_frame(&mut backend).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                image_index: 1,
                rebuilt: true
            }
        );
        assert_eq!(backend.calls.last(), Some(&Call::Rebuild));
        assert!(backend.calls.contains(&Call::Present(0, 1)));
    }

    #[test]
    fn test_present_outcomes_trigger_rebuild() {
        for present in [PresentOutcome::OutOfDate, PresentOutcome::Suboptimal] {
            let mut pacer = FramePacer::new(2, 3);
            let mut backend = ScriptedBackend::new(2, 3);
            backend.presents.push_back(present);

            pacer.draw_frame(&mut backend).unwrap();

            assert_eq!(backend.calls.last(), Some(&Call::Rebuild), "{present:?}");
            assert_eq!(pacer.stats().rebuilds, 1);
            assert_eq!(pacer.stats().frames_presented, 1);
        }
    }

    #[test]
    fn test_resize_flag_rebuilds_after_present_and_clears() {
        let mut pacer = FramePacer::new(2, 3);
        let mut backend = ScriptedBackend::new(2, 3);

        pacer.request_resize();
        pacer.request_resize();
        assert!(pacer.resize_requested());

        pacer.draw_frame(&mut backend).unwrap();
        assert!(!pacer.resize_requested());
        assert_eq!(backend.count(|c| matches!(c, Call::Rebuild)), 1);

        pacer.draw_frame(&mut backend).unwrap();
        assert_eq!(backend.count(|c| matches!(c, Call::Rebuild)), 1);
    }

    #[test]
    fn test_image_owned_by_other_slot_is_waited_on() {
        let mut pacer = FramePacer::new(2, 2);
        let mut backend = ScriptedBackend::new(2, 2);
        for _ in 0..2 {
            backend.acquires.push_back(AcquireOutcome::Acquired {
                image_index: 0,
                suboptimal: false,
            });
        }

        pacer.draw_frame(&mut backend).unwrap();
        backend.calls.clear();
        pacer.draw_frame(&mut backend).unwrap();

        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(1),
                Call::Acquire(1),
                Call::Wait(0),
                Call::Prepare(0),
                Call::Submit(1, 0),
                Call::Present(1, 0),
            ]
        );
    }

    #[test]
    fn test_rebuild_forgets_image_owners() {
        let mut pacer = FramePacer::new(2, 2);
        let mut backend = ScriptedBackend::new(2, 2);
        backend.acquires.push_back(AcquireOutcome::Acquired {
            image_index: 0,
            suboptimal: true,
        });
        backend.acquires.push_back(AcquireOutcome::Acquired {
            image_index: 0,
            suboptimal: false,
        });

        pacer.draw_frame(&mut backend).unwrap();
        backend.calls.clear();
        pacer.draw_frame(&mut backend).unwrap();

        assert_eq!(backend.count(|c| *c == Call::Wait(0)), 0, "{:?}", backend.calls);
    }

    #[test]
    fn test_rebuild_deferred_while_minimized() {
        let mut pacer = FramePacer::new(2, 3);
        let mut backend = ScriptedBackend::new(2, 3);
        backend.minimized = true;
        backend.presents.push_back(PresentOutcome::OutOfDate);

        let outcome = pacer.draw_frame(&mut backend).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                image_index: 0,
                rebuilt: false
            }
        );
        assert!(pacer.resize_requested());
        assert_eq!(backend.count(|c| *c == Call::Rebuild), 0);

        backend.minimized = false;
        let outcome = pacer.draw_frame(&mut backend).unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { rebuilt: true, .. }));
        assert!(!pacer.resize_requested());

        let stats = pacer.stats();
        assert_eq!(stats.rebuilds, 1);
        assert_eq!(stats.rebuilds_deferred, 1);
    }

    #[test]
    fn test_stale_acquire_while_minimized_skips_without_rebuild() {
        let mut pacer = FramePacer::new(2, 3);
        let mut backend = ScriptedBackend::new(2, 3);
        backend.minimized = true;
        backend.acquires.push_back(AcquireOutcome::OutOfDate);

        assert_eq!(pacer.draw_frame(&mut backend).unwrap(), FrameOutcome::Skipped);
        assert_eq!(backend.count(|c| *c == Call::Rebuild), 0);
        assert!(pacer.resize_requested());

        backend.minimized = false;
        pacer.draw_frame(&mut backend).unwrap();
        assert_eq!(backend.count(|c| *c == Call::Rebuild), 1);
        assert_eq!(pacer.stats().frames_skipped, 1);
    }

    #[test]
    fn test_single_frame_in_flight() {
        let mut pacer = FramePacer::new(0, 2);
        let mut backend = ScriptedBackend::new(1, 2);

        for _ in 0..3 {
            pacer.draw_frame(&mut backend).unwrap();
        }
        assert_eq!(pacer.frames_in_flight(), 1);
        assert_eq!(backend.count(|c| matches!(c, Call::Submit(0, _))), 3);
    }

    #[test]
    fn test_backend_error_propagates() {
        struct FailingPresent(ScriptedBackend);

        impl FrameBackend for FailingPresent {
            fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
                self.0.wait_for_slot(slot)
            }
            fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
                self.0.acquire_image(slot)
            }
            fn prepare_image(&mut self, image_index: u32) -> RhiResult<()> {
                self.0.prepare_image(image_index)
            }
            fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
                self.0.submit(slot, image_index)
            }
            fn present(&mut self, _slot: usize, _image_index: u32) -> RhiResult<PresentOutcome> {
                Err(RhiError::VulkanError(lumen_rhi::vk::Result::ERROR_DEVICE_LOST))
            }
            fn rebuild_swapchain(&mut self) -> RhiResult<usize> {
                self.0.rebuild_swapchain()
            }
        }

        let mut pacer = FramePacer::new(2, 3);
        let mut backend = FailingPresent(ScriptedBackend::new(2, 3));

        let err = pacer.draw_frame(&mut backend).unwrap_err();
        assert!(matches!(
            err,
            RhiError::VulkanError(lumen_rhi::vk::Result::ERROR_DEVICE_LOST)
        ));
        assert_eq!(pacer.stats().frames_presented, 0);
    }
}
