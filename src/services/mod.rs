pub mod image_upload;
pub mod linker;
pub mod record_store;
pub mod staging;
pub mod storage;
pub mod uploader;
pub mod worker;
