use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub fn fixture_path<P: AsRef<Path>>(path: P) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(path)
}

/// Read a test fixture from a path relative to tests/fixtures
pub fn read_fixture<P: AsRef<Path>>(path: P) -> Vec<u8> {
    std::fs::read(fixture_path(path)).expect("error reading file contents")
}

/// Parse a JSON rule, parameter or glyph fixture
pub fn read_json<T: serde::de::DeserializeOwned, P: AsRef<Path>>(path: P) -> T {
    serde_json::from_slice(&read_fixture(path)).expect("error parsing fixture")
}

/// Glyph ids by name from `glyphs.json`
pub fn glyph_ids() -> BTreeMap<String, u16> {
    read_json("glyphs.json")
}
