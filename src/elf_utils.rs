//! ELF loading (§0 ambient stack), grounded on the teacher's
//! `elf_utils.rs`: parse with the `elf` crate and copy loadable segment
//! bytes straight into the port's memory rather than restricting
//! loading to a single named section.

use elf::endian::AnyEndian;
use elf::ElfBytes;
use thiserror::Error;

use crate::demo::SimplePort;

#[derive(Debug, Error)]
pub enum ElfLoadError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed ELF file: {0}")]
    Parse(String),
}

/// Load every `PT_LOAD` segment of the ELF at `path` into `port`'s
/// memory at its virtual address, and return the entry point.
pub fn load_elf(port: &mut SimplePort, path: &str) -> Result<u32, ElfLoadError> {
    let bytes = std::fs::read(path).map_err(|source| ElfLoadError::Io { path: path.to_string(), source })?;
    let file = ElfBytes::<AnyEndian>::minimal_parse(&bytes).map_err(|e| ElfLoadError::Parse(e.to_string()))?;

    let segments = file
        .segments()
        .ok_or_else(|| ElfLoadError::Parse("no program headers".to_string()))?;

    for phdr in segments.iter() {
        const PT_LOAD: u32 = 1;
        if phdr.p_type != PT_LOAD {
            continue;
        }
        let start = phdr.p_offset as usize;
        let end = start + phdr.p_filesz as usize;
        let data = bytes
            .get(start..end)
            .ok_or_else(|| ElfLoadError::Parse("segment extends past end of file".to_string()))?;
        port.load_bytes(phdr.p_vaddr as u32, data);
    }

    Ok(file.ehdr.e_entry as u32)
}
