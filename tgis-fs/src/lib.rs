//! A concrete implementation of the `tgis::Mapper` interface backed by a directory.
//!
//! This allows a temporal database to be kept on the local filesystem, one file per record.
//!
use std::{
    io::{self, Write},
    mem,
    path::{Component, Path, PathBuf},
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use futures::{
    io::{AsyncRead, AsyncWrite, Cursor},
    task::{Context, Poll},
};
use tokio::fs;
use tracing::{debug, warn};

pub struct FsMapper {
    root: PathBuf,
    writes: AtomicU64,
}

impl FsMapper {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            writes: AtomicU64::new(0),
        }
    }

    /// Open the database directory named in the configuration.
    pub fn from_config(config: &tgis::TgisConfig) -> io::Result<Self> {
        match &config.database {
            Some(root) => Ok(Self::new(root)),
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no database directory configured",
            )),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a file under the root. Each '/' separated part of the key becomes a path
    /// component, and parts that would leave the root are refused.
    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        let mut path = self.root.clone();
        for part in key.split('/') {
            let mut components = Path::new(part).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => path.push(part),
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("bad key: {key}"),
                    ))
                }
            }
        }

        Ok(path)
    }
}

#[async_trait]
impl tgis::Mapper for FsMapper {
    /// Obtain an output stream for writing an object to the store.
    ///
    /// This implementation writes all data to memory and then writes it to disk when `finish`
    /// is called. The file is written under a temporary name and then renamed, so readers see
    /// either the old object or the new one.
    ///
    async fn store(&self, key: &str) -> Box<dyn tgis::StoreWrite + '_> {
        Box::new(FsStoreWrite::new(self, key))
    }

    async fn load(&self, key: &str) -> io::Result<Option<Box<dyn AsyncRead + Unpin + Send + '_>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(object) => Ok(Some(Box::new(Cursor::new(object)))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                warn!(path = %path.display(), %err, "unable to load object");
                Err(err)
            }
        }
    }

    async fn remove(&self, key: &str) -> io::Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed object");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// A writer for writing an object to the filesystem
///
/// All writes will, in fact, be written to RAM until `FsStoreWrite::finish` is called.
///
struct FsStoreWrite<'a> {
    mapper: &'a FsMapper,
    key: String,
    buffer: Vec<u8>,
}

impl<'a> FsStoreWrite<'a> {
    fn new(mapper: &'a FsMapper, key: &str) -> Self {
        Self {
            mapper,
            key: key.to_string(),
            buffer: Vec::new(),
        }
    }
}

impl<'a> AsyncWrite for FsStoreWrite<'a> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(self.buffer.write(buf))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl<'a> tgis::StoreWrite for FsStoreWrite<'a> {
    async fn finish(mut self: Box<Self>) -> io::Result<()> {
        let mapper = self.mapper;
        let path = mapper.path_for(&self.key)?;
        let parent = path.parent().unwrap_or(mapper.root.as_path());
        fs::create_dir_all(parent).await?;

        let write = mapper.writes.fetch_add(1, Ordering::Relaxed);
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = parent.join(format!(".{file_name}.{write}.tmp"));

        let object = mem::take(&mut self.buffer);
        fs::write(&temp, &object).await?;
        if let Err(err) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(err);
        }
        debug!(path = %path.display(), size = object.len(), "stored object");

        Ok(())
    }
}
