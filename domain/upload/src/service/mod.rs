mod content;
mod coordinator;
mod gateway;
mod part_scheduler;
mod session;

#[rustfmt::skip]
pub use {
    content::*,
    coordinator::*,
    gateway::*,
    part_scheduler::*,
    session::*,
};
