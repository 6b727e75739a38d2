use crate::identity::domain::encoding::{Encoding, FaceId};
use crate::shared::rectangle::Rectangle;

/// Something that happened to a tracked identity during one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum FaceEvent {
    /// First sighting since the identity's track was created.
    Appear {
        id: FaceId,
        rect: Rectangle,
        encoding: Encoding,
    },
    Move {
        id: FaceId,
        rect: Rectangle,
    },
    /// The track ran out of unmatched-frame budget.
    Disappear { id: FaceId },
}

/// Pending events, one FIFO per kind. Drained by `Recognizer::poll`.
#[derive(Debug, Default)]
pub struct EventQueues {
    pub appear: Vec<(FaceId, Rectangle, Encoding)>,
    pub disappear: Vec<FaceId>,
    pub moves: Vec<(FaceId, Rectangle)>,
}

impl EventQueues {
    pub fn push(&mut self, event: FaceEvent) {
        log::trace!("Enqueue {event:?}");
        match event {
            FaceEvent::Appear { id, rect, encoding } => self.appear.push((id, rect, encoding)),
            FaceEvent::Move { id, rect } => self.moves.push((id, rect)),
            FaceEvent::Disappear { id } => self.disappear.push(id),
        }
    }

    pub fn len(&self) -> usize {
        self.appear.len() + self.disappear.len() + self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
