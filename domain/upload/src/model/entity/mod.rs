mod file_record;
mod session;

#[rustfmt::skip]
pub use {
    file_record::FileRecord,
    session::UploadSession,
};
