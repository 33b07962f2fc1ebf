//! Expansion of symbolic glyph classes into sets of glyph ids.
//!
//! A name used in a rule is resolved with the first strategy that applies:
//!
//! 1. a named class, whose members are themselves resolved recursively,
//! 2. an exact glyph name,
//! 3. a hexadecimal glyph id literal,
//! 4. a regular expression matched against every glyph name.
//!
//! Results are memoized per name for the lifetime of the resolver.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use log::trace;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::error::ResolveError;
use crate::glyph::{GlyphId, GlyphOrder};

pub type GlyphSet = BTreeSet<GlyphId>;

#[derive(Debug, Default)]
pub struct ClassResolver {
    classes: FxHashMap<String, Vec<String>>,
    cache: RefCell<FxHashMap<String, Rc<GlyphSet>>>,
}

impl ClassResolver {
    pub fn new() -> ClassResolver {
        ClassResolver::default()
    }

    /// Define (or redefine) the class `name`.
    pub fn add_class<I, S>(&mut self, name: impl Into<String>, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classes
            .insert(name.into(), members.into_iter().map(Into::into).collect());
        // Any cached expansion may have depended on the old definition
        self.cache.get_mut().clear();
    }

    pub fn resolve(&self, name: &str, glyphs: &GlyphOrder) -> Result<Rc<GlyphSet>, ResolveError> {
        let mut visiting = Vec::new();
        self.resolve_inner(name, glyphs, &mut visiting)
    }

    /// Resolve each name and return the union of the results.
    pub fn resolve_union<'n>(
        &self,
        names: impl IntoIterator<Item = &'n str>,
        glyphs: &GlyphOrder,
    ) -> Result<GlyphSet, ResolveError> {
        let mut union = GlyphSet::new();
        for name in names {
            union.extend(self.resolve(name, glyphs)?.iter().copied());
        }
        Ok(union)
    }

    fn resolve_inner(
        &self,
        name: &str,
        glyphs: &GlyphOrder,
        visiting: &mut Vec<String>,
    ) -> Result<Rc<GlyphSet>, ResolveError> {
        if let Some(cached) = self.cache.borrow().get(name) {
            return Ok(Rc::clone(cached));
        }

        let set = if let Some(members) = self.classes.get(name) {
            if visiting.iter().any(|n| n == name) {
                return Err(ResolveError::CyclicClass(name.to_owned()));
            }
            visiting.push(name.to_owned());
            let mut set = GlyphSet::new();
            for member in members {
                set.extend(self.resolve_inner(member, glyphs, visiting)?.iter().copied());
            }
            visiting.pop();
            set
        } else if let Some(id) = glyphs.glyph_id(name) {
            GlyphSet::from([id])
        } else if let Some(id) = parse_glyph_code(name) {
            if glyphs.glyph_name(id).is_none() {
                return Err(ResolveError::UnknownGlyphId(id));
            }
            GlyphSet::from([id])
        } else {
            match_pattern(name, glyphs)?
        };

        trace!("class '{}' resolved to {} glyphs", name, set.len());
        let set = Rc::new(set);
        self.cache
            .borrow_mut()
            .insert(name.to_owned(), Rc::clone(&set));
        Ok(set)
    }
}

fn parse_glyph_code(name: &str) -> Option<GlyphId> {
    let digits = name
        .strip_prefix("0x")
        .or_else(|| name.strip_prefix("0X"))
        .unwrap_or(name);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

// Scans every glyph name, hence the last resort
fn match_pattern(pattern: &str, glyphs: &GlyphOrder) -> Result<GlyphSet, ResolveError> {
    let re = Regex::new(pattern).map_err(|err| ResolveError::BadPattern {
        pattern: pattern.to_owned(),
        message: err.to_string(),
    })?;
    let set: GlyphSet = glyphs
        .iter()
        .filter(|(name, _)| re.is_match(name))
        .map(|(_, id)| id)
        .collect();
    if set.is_empty() {
        return Err(ResolveError::EmptyClass(pattern.to_owned()));
    }
    Ok(set)
}
