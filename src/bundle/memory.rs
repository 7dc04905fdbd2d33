// src/bundle/memory.rs

//! In-memory bundle for tests and byte-addressable collaborators

use super::Bundle;
use crate::error::{Error, Result};
use crate::path::FilePath;
use std::collections::HashMap;
use std::io::{Cursor, Read};

/// A bundle backed by an ordered list of (path, bytes) pairs.
pub struct MemoryBundle {
    paths: Vec<FilePath>,
    members: HashMap<FilePath, Vec<u8>>,
    installed_size: u64,
}

impl MemoryBundle {
    pub fn new<S: AsRef<str>>(entries: Vec<(S, Vec<u8>)>) -> Result<Self> {
        let mut paths = Vec::with_capacity(entries.len());
        let mut members = HashMap::with_capacity(entries.len());
        let mut installed_size = 0u64;

        for (path, data) in entries {
            let path = FilePath::parse(path.as_ref())?;
            installed_size += data.len() as u64;
            paths.push(path.clone());
            members.insert(path, data);
        }

        Ok(Self {
            paths,
            members,
            installed_size,
        })
    }

    fn member(&self, path: &FilePath) -> Result<&Vec<u8>> {
        self.members
            .get(path)
            .ok_or_else(|| Error::NotFound(format!("bundle member {}", path)))
    }
}

impl Bundle for MemoryBundle {
    fn installed_size(&self) -> u64 {
        self.installed_size
    }

    fn paths(&self) -> &[FilePath] {
        &self.paths
    }

    fn contains(&self, path: &FilePath) -> bool {
        self.members.contains_key(path)
    }

    fn open<'a>(&'a self, path: &FilePath) -> Result<Box<dyn Read + 'a>> {
        Ok(Box::new(Cursor::new(self.member(path)?.as_slice())))
    }

    fn get_bytes(&self, path: &FilePath) -> Result<Vec<u8>> {
        Ok(self.member(path)?.clone())
    }

    fn get_size(&self, path: &FilePath) -> Result<u64> {
        Ok(self.member(path)?.len() as u64)
    }
}
