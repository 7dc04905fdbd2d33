// src/patch/macho.rs

//! Structured search-path insertion for Mach-O containers
//!
//! Appends `LC_RPATH` load commands into the zero slack between the end
//! of the load-command list and the first section's file bytes, then
//! updates `ncmds`/`sizeofcmds` so the result stays a structurally valid
//! container. The file length never changes: slack is overwritten in
//! place.
//!
//! Only thin little-endian 64-bit images are handled; fat, 32-bit, and
//! big-endian containers (and images without enough slack) are logged
//! and left untouched rather than guessed at. The strategy is pluggable
//! behind [`super::StructuredStrategy`] so a layout validated against
//! other container variants can be swapped in.

use super::StructuredStrategy;
use crate::error::{Error, Result};
use goblin::mach::MachO;
use std::path::Path;
use tracing::{debug, warn};

const MH_MAGIC_64_LE: [u8; 4] = [0xcf, 0xfa, 0xed, 0xfe];

const MACH_MAGICS: [[u8; 4]; 6] = [
    MH_MAGIC_64_LE,
    [0xce, 0xfa, 0xed, 0xfe], // 32-bit LE
    [0xfe, 0xed, 0xfa, 0xcf], // 64-bit BE
    [0xfe, 0xed, 0xfa, 0xce], // 32-bit BE
    [0xca, 0xfe, 0xba, 0xbe], // fat
    [0xbe, 0xba, 0xfe, 0xca], // fat, byte-swapped
];

const LC_RPATH: u32 = 0x8000_001c;
const HEADER_SIZE: usize = 32;
const NCMDS_OFFSET: usize = 16;
const SIZEOFCMDS_OFFSET: usize = 20;

// successful MachO::parse guarantees the full header is present
fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// `LC_RPATH` appender for thin little-endian 64-bit Mach-O images.
pub struct MachORpath;

impl MachORpath {
    /// Size of one LC_RPATH command for `path`, 8-byte aligned.
    fn command_size(path: &str) -> usize {
        (12 + path.len() + 1).next_multiple_of(8)
    }

    /// File offset of the first section's bytes: nothing after the load
    /// commands may be overwritten beyond this point.
    fn first_section_offset(macho: &MachO, len: usize) -> Result<usize> {
        let mut first = len;
        for segment in &macho.segments {
            let sections = segment
                .sections()
                .map_err(|e| Error::Format(format!("bad Mach-O segment: {}", e)))?;
            for (section, _) in sections {
                if section.size > 0 && section.offset > 0 {
                    first = first.min(section.offset as usize);
                }
            }
        }
        Ok(first)
    }
}

impl StructuredStrategy for MachORpath {
    fn name(&self) -> &'static str {
        "macho-rpath"
    }

    fn applies(&self, data: &[u8]) -> bool {
        data.len() >= 4 && MACH_MAGICS.iter().any(|magic| data.starts_with(magic))
    }

    fn patch(&self, path: &Path, data: &[u8], targets: &[String]) -> Result<Option<Vec<u8>>> {
        if !data.starts_with(&MH_MAGIC_64_LE) {
            warn!(
                "Leaving {} unpatched: unsupported Mach-O variant",
                path.display()
            );
            return Ok(None);
        }

        let macho = MachO::parse(data, 0)
            .map_err(|e| Error::Format(format!("malformed Mach-O {}: {}", path.display(), e)))?;

        let new_targets: Vec<&String> = targets
            .iter()
            .filter(|t| !macho.rpaths.contains(&t.as_str()))
            .collect();
        if new_targets.is_empty() {
            debug!("All rpaths already present in {}", path.display());
            return Ok(None);
        }

        let sizeofcmds = read_u32_le(data, SIZEOFCMDS_OFFSET);
        let ncmds = read_u32_le(data, NCMDS_OFFSET);

        let commands_end = HEADER_SIZE + sizeofcmds as usize;
        let needed: usize = new_targets.iter().map(|t| Self::command_size(t)).sum();
        let limit = Self::first_section_offset(&macho, data.len())?;

        let fits = commands_end + needed <= limit
            && data[commands_end..commands_end + needed].iter().all(|&b| b == 0);
        if !fits {
            warn!(
                "Leaving {} unpatched: no room for {} bytes of rpath commands",
                path.display(),
                needed
            );
            return Ok(None);
        }

        let mut patched = data.to_vec();
        let mut cursor = commands_end;
        for target in &new_targets {
            let cmdsize = Self::command_size(target);
            patched[cursor..cursor + 4].copy_from_slice(&LC_RPATH.to_le_bytes());
            patched[cursor + 4..cursor + 8].copy_from_slice(&(cmdsize as u32).to_le_bytes());
            patched[cursor + 8..cursor + 12].copy_from_slice(&12u32.to_le_bytes());
            patched[cursor + 12..cursor + 12 + target.len()]
                .copy_from_slice(target.as_bytes());
            // remainder of the command is already NUL slack
            cursor += cmdsize;
        }

        let new_ncmds = ncmds + new_targets.len() as u32;
        let new_sizeofcmds = sizeofcmds + needed as u32;
        patched[NCMDS_OFFSET..NCMDS_OFFSET + 4].copy_from_slice(&new_ncmds.to_le_bytes());
        patched[SIZEOFCMDS_OFFSET..SIZEOFCMDS_OFFSET + 4]
            .copy_from_slice(&new_sizeofcmds.to_le_bytes());

        debug!(
            "Appended {} rpath command(s) to {}",
            new_targets.len(),
            path.display()
        );
        Ok(Some(patched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applies_to_mach_magic_only() {
        let strategy = MachORpath;
        assert!(strategy.applies(&[0xcf, 0xfa, 0xed, 0xfe, 0, 0]));
        assert!(strategy.applies(&[0xca, 0xfe, 0xba, 0xbe, 0, 0]));
        assert!(!strategy.applies(b"\x7fELF"));
        assert!(!strategy.applies(b"MZ"));
        assert!(!strategy.applies(&[0xcf]));
    }

    #[test]
    fn test_unsupported_variant_left_untouched() {
        let strategy = MachORpath;
        // big-endian 64-bit image: recognized but not rewritten
        let data = [0xfe, 0xed, 0xfa, 0xcf, 0, 0, 0, 0];
        let targets = vec!["/opt/lib".to_string()];
        let out = strategy.patch(Path::new("foo"), &data, &targets).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_command_size_alignment() {
        // 12 byte fixed part + path + NUL, rounded up to 8
        assert_eq!(MachORpath::command_size("/a"), 16);
        assert_eq!(MachORpath::command_size("/ab"), 16);
        assert_eq!(MachORpath::command_size("/abc"), 24);
        assert_eq!(MachORpath::command_size("/abcd"), 24);
    }
}
