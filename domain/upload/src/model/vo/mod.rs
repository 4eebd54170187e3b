mod event;
mod gateway;
mod links;
mod quota;
mod state;
mod transfer;
mod transition;

#[rustfmt::skip]
pub use {
    event::*,
    gateway::*,
    links::*,
    quota::*,
    state::*,
    transfer::*,
    transition::*,
};
