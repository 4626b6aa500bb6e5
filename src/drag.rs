//! Pointer interaction on top of a [`RouteDraft`].
//!
//! A drag either moves an existing marker or pulls a new waypoint out of the
//! route line. While a drag is in progress clicks don't add points, and a
//! drag on the line also holds the map still. Both are restored exactly once
//! when the drag ends, whether or not the pointer moved.

use crate::draft::RouteDraft;
use crate::osrm::RoutingBackend;
use crate::Point;
use log::debug;

/// What is being dragged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragTarget {
    /// The marker of the waypoint at this index
    Marker(usize),
    /// The route line, grabbed at `anchor`
    Line {
        /// Where on the line the drag started
        anchor: Point,
    },
}

/// Progress of a drag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    /// Nothing is being dragged
    Idle,
    /// The pointer is down and moving
    Dragging {
        /// What is being dragged
        target: DragTarget,
        /// Where the drag started
        start: Point,
        /// Where the pointer is now
        current: Point,
    },
    /// The pointer was released and the change is being applied
    Committing,
}

/// A draft plus the interaction state around it.
#[derive(Debug)]
pub struct Editor {
    draft: RouteDraft,
    drag: DragState,
    click_to_add_enabled: bool,
    map_panning_enabled: bool,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(RouteDraft::new())
    }
}

impl Editor {
    /// Wrap a draft
    pub fn new(draft: RouteDraft) -> Self {
        Editor {
            draft,
            drag: DragState::Idle,
            click_to_add_enabled: true,
            map_panning_enabled: true,
        }
    }

    /// The draft being edited
    pub fn draft(&self) -> &RouteDraft {
        &self.draft
    }

    /// Mutable access for operations outside of pointer interaction, such
    /// as loading or resetting.
    ///
    /// `None` while a drag is in progress: a marker drag holds a waypoint
    /// index that any other edit could invalidate.
    pub fn draft_mut(&mut self) -> Option<&mut RouteDraft> {
        if self.is_dragging() {
            debug!("Refusing draft edit during drag");
            return None;
        }
        Some(&mut self.draft)
    }

    /// Current drag state
    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    /// Whether a drag is in progress
    pub fn is_dragging(&self) -> bool {
        !matches!(self.drag, DragState::Idle)
    }

    /// Whether clicking the map adds a point
    pub fn click_to_add_enabled(&self) -> bool {
        self.click_to_add_enabled
    }

    /// Whether the map may pan
    pub fn map_panning_enabled(&self) -> bool {
        self.map_panning_enabled
    }

    /// A click on the map. Returns true if a point was added.
    pub fn click<B: RoutingBackend + ?Sized>(&mut self, backend: &B, position: Point) -> bool {
        if !self.click_to_add_enabled || self.is_dragging() {
            debug!("Ignoring click at {:?} during drag", position);
            return false;
        }
        self.draft.add_point(backend, position);
        true
    }

    /// Start dragging the marker of waypoint `index`.
    pub fn begin_marker_drag(&mut self, index: usize, start: Point) -> bool {
        if self.is_dragging() || index >= self.draft.points().len() {
            return false;
        }
        self.click_to_add_enabled = false;
        self.drag = DragState::Dragging {
            target: DragTarget::Marker(index),
            start,
            current: start,
        };
        true
    }

    /// Start pulling a new waypoint out of the route line at `anchor`.
    pub fn begin_line_drag(&mut self, anchor: Point) -> bool {
        if self.is_dragging() || self.draft.points().len() < 2 {
            return false;
        }
        self.click_to_add_enabled = false;
        self.map_panning_enabled = false;
        self.drag = DragState::Dragging {
            target: DragTarget::Line { anchor },
            start: anchor,
            current: anchor,
        };
        true
    }

    /// The pointer moved. Returns false if nothing is being dragged.
    pub fn drag_to(&mut self, position: Point) -> bool {
        match &mut self.drag {
            DragState::Dragging { current, .. } => {
                *current = position;
                true
            }
            _ => false,
        }
    }

    /// The pointer was released. Applies the drag if the pointer moved and
    /// returns whether anything changed.
    pub fn end_drag<B: RoutingBackend + ?Sized>(&mut self, backend: &B) -> bool {
        let DragState::Dragging {
            target,
            start,
            current,
        } = std::mem::replace(&mut self.drag, DragState::Committing)
        else {
            self.drag = DragState::Idle;
            return false;
        };

        let changed = if current == start {
            false
        } else {
            match target {
                DragTarget::Marker(index) => self.draft.move_point(backend, index, current),
                DragTarget::Line { anchor } => self
                    .draft
                    .insert_on_current_route(backend, current, anchor)
                    .is_some(),
            }
        };

        self.finish_drag();
        changed
    }

    /// Abandon the drag without changing the draft.
    pub fn cancel_drag(&mut self) {
        if let DragState::Dragging { .. } = self.drag {
            self.finish_drag();
        }
    }

    fn finish_drag(&mut self) {
        self.drag = DragState::Idle;
        self.click_to_add_enabled = true;
        self.map_panning_enabled = true;
    }
}
