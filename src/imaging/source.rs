//! Where encoded image bytes come from.
//!
//! A source is either a file on disk or an opaque handle that a
//! [`ContentResolver`] turns into a readable stream. Resolving URIs, content
//! providers and permissions is the resolver's business; this module only
//! consumes the stream it hands back.
//!
//! Every [`ImageSource::open`] call yields a fresh [`SourceStream`] that owns
//! its reader. Dropping the stream closes it, so a failed decode attempt never
//! keeps a descriptor open into the next retry.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;

/// Turns an opaque content handle into a byte stream.
pub trait ContentResolver: Sync {
    fn open(&self, handle: &str) -> io::Result<Box<dyn Read + Send>>;
}

/// Borrowed reference to encoded image bytes.
pub enum ImageSource<'a> {
    File(PathBuf),
    Content {
        handle: String,
        resolver: &'a dyn ContentResolver,
    },
}

impl<'a> ImageSource<'a> {
    pub fn content(handle: impl Into<String>, resolver: &'a dyn ContentResolver) -> Self {
        Self::Content {
            handle: handle.into(),
            resolver,
        }
    }

    /// Acquire a new stream over the source bytes.
    pub fn open(&self) -> io::Result<SourceStream> {
        let reader: Box<dyn Read + Send> = match self {
            Self::File(path) => Box::new(BufReader::new(File::open(path)?)),
            Self::Content { handle, resolver } => resolver.open(handle)?,
        };
        Ok(SourceStream { reader })
    }

    /// Read the whole source into memory, releasing the stream before returning.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut stream = self.open()?;
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl fmt::Display for ImageSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Content { handle, .. } => write!(f, "content:{handle}"),
        }
    }
}

impl fmt::Debug for ImageSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Content { handle, .. } => f
                .debug_struct("Content")
                .field("handle", handle)
                .finish_non_exhaustive(),
        }
    }
}

/// An open read handle; closed on drop.
pub struct SourceStream {
    reader: Box<dyn Read + Send>,
}

impl Read for SourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}
