mod coordinator;
mod part_scheduler;
mod registry;
mod request;
mod session;

#[rustfmt::skip]
pub use {
    coordinator::SessionCoordinatorServiceImpl,
    part_scheduler::PartSchedulerServiceImpl,
    registry::SessionRegistry,
    request::RetryPolicy,
    session::UploadSessionServiceImpl,
};
