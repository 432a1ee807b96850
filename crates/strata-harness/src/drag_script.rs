#![forbid(unsafe_code)]

//! Scripted drag gestures.
//!
//! A [`DragScript`] is a list of `(target, event)` steps replayed against a
//! [`LayerPanel`], the way a host would forward pointer events.
//!
//! ```
//! use strata_core::Modifiers;
//! use strata_harness::{DragScript, fixtures};
//! use strata_layers::{DragContext, DropTargetId, LayerPanel};
//!
//! let (layers, ids) = fixtures::collection(&["a", "b"]);
//! let mut panel = LayerPanel::new(&layers, &DragContext::new());
//! DragScript::start(&panel, &[ids[0]])
//!     .over(DropTargetId::DropZone, Modifiers::SHIFT)
//!     .drop(DropTargetId::DropZone, Modifiers::SHIFT)
//!     .run(&mut panel);
//! assert_eq!(layers.names(), ["a", "b", "a (2)"]);
//! ```

use strata_core::{DragEvent, DragEventKind, Modifiers};
use strata_layers::{DragPayload, DragResponse, DropTargetId, LayerId, LayerPanel};
use tracing::trace;

/// One forwarded event.
#[derive(Debug, Clone)]
pub struct DragStep {
    pub target: DropTargetId,
    pub event: DragEvent<DragPayload>,
}

/// Builder and player for drag event sequences.
#[derive(Debug, Clone, Default)]
pub struct DragScript {
    payload: Option<DragPayload>,
    carry_payload: bool,
    steps: Vec<DragStep>,
}

impl DragScript {
    /// Start a drag of `layers` on `panel`. The payload is recorded in the
    /// panel's drag context; events carry none, like a host that cannot read
    /// the payload until the drop.
    pub fn start(panel: &LayerPanel, layers: &[LayerId]) -> Self {
        Self {
            payload: panel.drag_start(layers),
            carry_payload: false,
            steps: Vec::new(),
        }
    }

    /// A gesture that started elsewhere; every event carries `payload`.
    #[must_use]
    pub fn with_payload(payload: DragPayload) -> Self {
        Self {
            payload: Some(payload),
            carry_payload: true,
            steps: Vec::new(),
        }
    }

    /// Payload recorded at the start of the gesture.
    #[must_use]
    pub fn payload(&self) -> Option<&DragPayload> {
        self.payload.as_ref()
    }

    #[must_use]
    pub fn steps(&self) -> &[DragStep] {
        &self.steps
    }

    #[must_use]
    pub fn enter(self, target: DropTargetId, modifiers: Modifiers) -> Self {
        self.push(target, DragEventKind::Enter, modifiers)
    }

    #[must_use]
    pub fn over(self, target: DropTargetId, modifiers: Modifiers) -> Self {
        self.push(target, DragEventKind::Over, modifiers)
    }

    /// The pointer left the panel.
    #[must_use]
    pub fn leave(self) -> Self {
        self.push(DropTargetId::DropZone, DragEventKind::Leave, Modifiers::NONE)
    }

    /// The pointer moved between elements of the panel.
    #[must_use]
    pub fn leave_into_child(mut self) -> Self {
        self = self.leave();
        if let Some(step) = self.steps.last_mut() {
            step.event.related_inside = true;
        }
        self
    }

    /// Drop; the event always carries the payload, as hosts deliver it on
    /// drop.
    #[must_use]
    pub fn drop(mut self, target: DropTargetId, modifiers: Modifiers) -> Self {
        let mut event = DragEvent::new(DragEventKind::Drop).with_modifiers(modifiers);
        event.payload = self.payload.clone();
        self.steps.push(DragStep { target, event });
        self
    }

    #[must_use]
    pub fn end(self) -> Self {
        self.push(DropTargetId::DropZone, DragEventKind::End, Modifiers::NONE)
    }

    /// Replay every step against `panel`.
    pub fn run(&self, panel: &mut LayerPanel) -> Vec<DragResponse> {
        self.steps
            .iter()
            .map(|step| {
                let response = panel.handle_drag(step.target, &step.event);
                trace!(
                    target: "strata.harness",
                    kind = step.event.kind.as_str(),
                    ?response,
                    "drag step"
                );
                response
            })
            .collect()
    }

    fn push(mut self, target: DropTargetId, kind: DragEventKind, modifiers: Modifiers) -> Self {
        let mut event = DragEvent::new(kind).with_modifiers(modifiers);
        if self.carry_payload {
            event.payload = self.payload.clone();
        }
        self.steps.push(DragStep { target, event });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use strata_layers::DragContext;

    #[test]
    fn leave_into_child_keeps_speculative_copy() {
        let (layers, ids) = fixtures::collection(&["a", "b"]);
        let mut panel = LayerPanel::new(&layers, &DragContext::new());
        let script = DragScript::start(&panel, &[ids[1]])
            .enter(DropTargetId::Row(ids[0]), Modifiers::SHIFT)
            .leave_into_child();
        script.run(&mut panel);
        assert_eq!(layers.names(), ["b (2)", "a", "b"]);

        DragScript::default().leave().run(&mut panel);
        assert_eq!(layers.names(), ["a", "b"]);
    }

    #[test]
    fn end_without_drop_clears_context() {
        let (layers, ids) = fixtures::collection(&["a"]);
        let context = DragContext::new();
        let mut panel = LayerPanel::new(&layers, &context);
        let responses = DragScript::start(&panel, &[ids[0]])
            .enter(DropTargetId::DropZone, Modifiers::SHIFT)
            .end()
            .run(&mut panel);
        assert_eq!(responses[0], DragResponse::Accepted);
        assert_eq!(layers.names(), ["a"]);
        assert!(!context.is_active());
    }
}
