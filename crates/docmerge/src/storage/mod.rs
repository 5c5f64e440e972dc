pub mod filesystem;

pub use filesystem::{
    ensure_directory, materialize_failed_artifacts, relocate_files, transfer_file,
    unique_destination, MovedFile, RelocatedFile, Relocation, MAX_RELOCATED_NAME_LEN,
};
