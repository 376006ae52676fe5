//! Tracking numbers and tracking folders
//!
//! A tracking number is a timestamp, it names the folder where every file of a
//! measurement, calibration or alignment run is written.
//! A tracking folder is created once: creating a folder that already exists fails.

use std::{
    fmt::Display,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{OttError, Result};

/// Timestamp derived unique identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackingNumber(String);

impl TrackingNumber {
    /// Creates a tracking number from the local time: `YYYYMMDD_HHMMSS`
    pub fn now() -> Self {
        let now: DateTime<Local> = Local::now();
        Self(now.format("%Y%m%d_%H%M%S").to_string())
    }
    /// Compound tracking number `self--other`
    pub fn compound(&self, other: &TrackingNumber) -> Self {
        Self(format!("{}--{}", self.0, other.0))
    }
    /// Splits a compound tracking number
    pub fn split(&self) -> Option<(TrackingNumber, TrackingNumber)> {
        self.0
            .split_once("--")
            .map(|(a, b)| (Self(a.to_string()), Self(b.to_string())))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for TrackingNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
impl<S: Into<String>> From<S> for TrackingNumber {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// A write-once tracking folder
#[derive(Debug, Clone)]
pub struct TtFolder {
    path: PathBuf,
    tt: TrackingNumber,
}
impl TtFolder {
    /// Creates a new folder named after the current time into `root`
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::create_with(root, TrackingNumber::now())
    }
    /// Creates a new folder named `tt` into `root`
    ///
    /// Fails with [OttError::FolderExists] if the folder is already there
    pub fn create_with<P: AsRef<Path>>(root: P, tt: TrackingNumber) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|e| OttError::Io(e, root.to_path_buf()))?;
        let path = root.join(tt.as_str());
        match fs::create_dir(&path) {
            Ok(_) => {
                log::info!("new tracking folder: {:?}", path);
                Ok(Self { path, tt })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(OttError::FolderExists(path)),
            Err(e) => Err(OttError::Io(e, path)),
        }
    }
    /// Opens an existing tracking folder
    pub fn open<P: AsRef<Path>>(root: P, tt: TrackingNumber) -> Result<Self> {
        let path = root.as_ref().join(tt.as_str());
        if path.is_dir() {
            Ok(Self { path, tt })
        } else {
            Err(OttError::Io(
                io::Error::new(io::ErrorKind::NotFound, "tracking folder not found"),
                path,
            ))
        }
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn tracking_number(&self) -> &TrackingNumber {
        &self.tt
    }
    pub fn join<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.path.join(name)
    }
    /// Writes `data` into the pickle file `name`
    pub fn dump<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        dump(self.join(name), data)
    }
    /// Reads the pickle file `name`
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        load(self.join(name))
    }
    /// Writes a text file `name`
    pub fn write_text(&self, name: &str, text: &str) -> Result<()> {
        let path = self.join(name);
        let mut file = File::create(&path).map_err(|e| OttError::Io(e, path.clone()))?;
        file.write_all(text.as_bytes())
            .map_err(|e| OttError::Io(e, path))?;
        Ok(())
    }
}

/// Serializes `data` into a pickle file
pub fn dump<P: AsRef<Path>, T: Serialize>(path: P, data: &T) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path).map_err(|e| OttError::Io(e, path.to_path_buf()))?;
    serde_pickle::to_writer(&mut file, data, Default::default())
        .map_err(|e| OttError::Pickle(e, path.to_path_buf()))?;
    log::debug!("{:?} written", path);
    Ok(())
}

/// Deserializes a pickle file
pub fn load<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| OttError::Io(e, path.to_path_buf()))?;
    serde_pickle::from_reader(file, Default::default())
        .map_err(|e| OttError::Pickle(e, path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_once() {
        let root = tempfile::tempdir().unwrap();
        let tt = TrackingNumber::from("20240101_120000");
        let folder = TtFolder::create_with(root.path(), tt.clone()).unwrap();
        assert!(folder.path().is_dir());
        assert!(matches!(
            TtFolder::create_with(root.path(), tt),
            Err(OttError::FolderExists(_))
        ));
    }

    #[test]
    fn compound() {
        let cal = TrackingNumber::from("20240101_120000");
        let al = TrackingNumber::from("20240102_080000");
        let tt = cal.compound(&al);
        assert_eq!(tt.as_str(), "20240101_120000--20240102_080000");
        assert_eq!(tt.split(), Some((cal, al)));
    }

    #[test]
    fn timestamp_format() {
        let tt = TrackingNumber::now();
        assert_eq!(tt.as_str().len(), 15);
        assert_eq!(&tt.as_str()[8..9], "_");
    }
}
