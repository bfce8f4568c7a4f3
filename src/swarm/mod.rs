//! C7: the canonical swarm coordinator — topology, message bus, consensus,
//! and the swarm-wide lifecycle state machine.

mod consensus;
mod coordinator;
mod message_bus;
mod topology;

pub use consensus::{ConsensusCoordinator, ConsensusOutcome, ConsensusStrategy, QuorumVoteStrategy, RaftLikeStrategy};
pub use coordinator::{SwarmCoordinator, SwarmDependencies, SwarmState};
pub use message_bus::{Message, MessageBus, MessageTarget};
pub use topology::{ConsecutiveUnhealthyPolicy, Topology, TopologyAdaptationPolicy, TopologyKind};
