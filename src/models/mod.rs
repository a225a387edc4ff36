pub mod project;
pub mod timestamp;

pub use project::{
    Bid, BidStatus, Contract, ContractStatus, Milestone, MilestoneStatus, Project,
    ProjectStatus, TimeLog,
};
