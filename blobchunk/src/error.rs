use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No input files specified")]
    NoFilesSpecified,

    #[error("Image `{}` already exists (use --force to overwrite)", .path.display())]
    ImageExists { path: PathBuf },

    #[error("Invalid store options")]
    InvalidOptions(#[source] blobchunk_format::Error),

    #[error("Cannot open input `{}`", .path.display())]
    OpenInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create chunk store")]
    CreateStore(#[source] blobchunk_format::Error),

    #[error("Cannot walk directory `{}`", .path.display())]
    WalkDirectory {
        path: PathBuf,
        #[source]
        source: jwalk::Error,
    },

    #[error("Cannot chunk file `{}`", .path.display())]
    ChunkFile {
        path: PathBuf,
        #[source]
        source: blobchunk_format::Error,
    },

    #[error("Cannot create image `{}`", .path.display())]
    CreateImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open image `{}`", .path.display())]
    OpenImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot move chunk data into image `{}`", .path.display())]
    Remap {
        path: PathBuf,
        #[source]
        source: blobchunk_format::Error,
    },

    #[error("Cannot write chunk index for `{path}`")]
    WriteIndex {
        path: String,
        #[source]
        source: blobchunk_format::Error,
    },

    #[error("Cannot write manifest `{}`", .path.display())]
    WriteManifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read manifest `{}`", .path.display())]
    ReadManifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{path}` is not listed in the manifest")]
    NotInManifest { path: String },

    #[error("Cannot read `{path}` from image")]
    ReadFile {
        path: String,
        #[source]
        source: blobchunk_format::Error,
    },

    #[error("Cannot start chunking thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
