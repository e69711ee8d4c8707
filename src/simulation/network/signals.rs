use crate::simulation::error::SimError;
use crate::simulation::id::Id;
use crate::simulation::network::Link;
use nohash_hasher::IntMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalGroupState {
    Green,
    Yellow,
    Red,
    RedYellow,
    /// The signal is switched off. Traffic may pass.
    Off,
}

impl SignalGroupState {
    pub fn is_green(self) -> bool {
        matches!(self, SignalGroupState::Green | SignalGroupState::Off)
    }
}

/// Signal states of the turning moves from one link into the out links of its to node.
#[derive(Debug, Clone)]
pub struct SignalizedItem {
    states: IntMap<Id<Link>, SignalGroupState>,
}

impl SignalizedItem {
    /// All turning moves start green.
    pub fn new(to_links: &[Id<Link>]) -> Self {
        SignalizedItem {
            states: to_links
                .iter()
                .map(|id| (id.clone(), SignalGroupState::Green))
                .collect(),
        }
    }

    pub fn set_all_turning_moves(&mut self, state: SignalGroupState) {
        for s in self.states.values_mut() {
            *s = state;
        }
    }

    pub fn set_turning_move(
        &mut self,
        from_link: &Id<Link>,
        to_link: &Id<Link>,
        state: SignalGroupState,
    ) -> Result<(), SimError> {
        let s = self
            .states
            .get_mut(to_link)
            .ok_or_else(|| SimError::UnreachableTurningMove {
                from_link: from_link.external().to_string(),
                to_link: to_link.external().to_string(),
            })?;
        *s = state;
        Ok(())
    }

    pub fn is_green_for(&self, to_link: &Id<Link>) -> bool {
        self.states.get(to_link).is_some_and(|s| s.is_green())
    }

    /// The link is green as long as any of its turning moves is green.
    pub fn is_link_green(&self) -> bool {
        self.states.values().any(|s| s.is_green())
    }
}
