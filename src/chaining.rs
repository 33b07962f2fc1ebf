//! Chaining contextual substitution and positioning, format 3.
//!
//! <https://docs.microsoft.com/en-us/typography/opentype/spec/gsub#chseqctxt3>

use log::debug;
use serde::Deserialize;

use crate::binary::write::{WriteBinary, WriteBuffer, WriteContext};
use crate::binary::U16Be;
use crate::classes::GlyphSet;
use crate::context::LayoutContext;
use crate::error::{CompileError, WriteError};
use crate::layout::coverage::{Coverage, OffsetCursor};
use crate::layout::EncodeContext;
use crate::size;

/// A chaining rule as written in the rule files.
///
/// Each position of `backtrack`, `input` and `lookahead` lists the classes whose union
/// matches at that position. Backtrack positions are declared in reading order, the last one
/// being adjacent to the input sequence.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChainingRule {
    #[serde(default)]
    pub backtrack: Vec<Vec<String>>,
    #[serde(default)]
    pub input: Vec<Vec<String>>,
    #[serde(default)]
    pub lookahead: Vec<Vec<String>>,
    #[serde(default)]
    pub lookuprecords: Vec<LookupRecordRule>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LookupRecordRule {
    Record { position: u16, lookup: String },
    Pair(u16, String),
    /// A lookup applied at the input position equal to the record's index.
    Name(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupRecord {
    pub position: u16,
    pub lookup_name: String,
}

/// A chaining rule with its classes expanded to glyph sets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledRule {
    pub backtrack: Vec<GlyphSet>,
    pub input: Vec<GlyphSet>,
    pub lookahead: Vec<GlyphSet>,
    pub lookup_records: Vec<LookupRecord>,
}

impl CompiledRule {
    pub fn compile(rule: &ChainingRule, context: &LayoutContext) -> Result<CompiledRule, CompileError> {
        let expand = |positions: &[Vec<String>]| -> Result<Vec<GlyphSet>, CompileError> {
            positions
                .iter()
                .map(|classes| Ok(context.resolve_classes(classes.iter().map(String::as_str))?))
                .collect()
        };

        let mut lookup_records = Vec::with_capacity(rule.lookuprecords.len());
        for (index, record) in rule.lookuprecords.iter().enumerate() {
            let (position, lookup_name) = match record {
                LookupRecordRule::Record { position, lookup } | LookupRecordRule::Pair(position, lookup) => {
                    (*position, lookup.clone())
                }
                LookupRecordRule::Name(lookup) => (u16::try_from(index)?, lookup.clone()),
            };
            lookup_records.push(LookupRecord {
                position,
                lookup_name,
            });
        }

        Ok(CompiledRule {
            backtrack: expand(&rule.backtrack)?,
            input: expand(&rule.input)?,
            lookahead: expand(&rule.lookahead)?,
            lookup_records,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainingContext {
    rule: CompiledRule,
}

impl ChainingContext {
    pub fn populate(rule: &ChainingRule, context: &LayoutContext) -> Result<ChainingContext, CompileError> {
        CompiledRule::compile(rule, context).map(ChainingContext::new)
    }

    pub fn new(rule: CompiledRule) -> ChainingContext {
        ChainingContext { rule }
    }

    pub fn rule(&self) -> &CompiledRule {
        &self.rule
    }

    /// Encode the rule. Lookup names are resolved against the lookups of the table being
    /// compiled, scoped to the lookup that owns this subtable.
    pub fn encode(&self, ecx: &mut EncodeContext<'_>) -> Result<Vec<u8>, CompileError> {
        let rule = &self.rule;
        let mut records = Vec::with_capacity(rule.lookup_records.len());
        for record in &rule.lookup_records {
            if usize::from(record.position) >= rule.input.len() {
                return Err(CompileError::Write(WriteError::BadValue));
            }
            let index = ecx.layout.lookup_index(ecx.table, ecx.lookup, &record.lookup_name)?;
            records.push((record.position, index));
        }

        // Backtrack coverages are stored closest to the input first
        let coverages: Vec<Coverage> = rule
            .backtrack
            .iter()
            .rev()
            .chain(&rule.input)
            .chain(&rule.lookahead)
            .map(|glyphs| Coverage::new(glyphs.iter().copied()))
            .collect();
        let header_size = size::U16
            + 3 * size::U16
            + coverages.len() * size::OFFSET16
            + size::U16
            + records.len() * 2 * size::U16;
        let mut offsets = OffsetCursor::new(header_size);
        let mut coverage_offsets = Vec::with_capacity(coverages.len());
        for coverage in &coverages {
            coverage_offsets.push(offsets.advance(coverage.size())?);
        }

        let mut ctxt = WriteBuffer::new();
        U16Be::write(&mut ctxt, 3u16)?; // format
        let (backtrack, rest) = coverage_offsets.split_at(rule.backtrack.len());
        let (input, lookahead) = rest.split_at(rule.input.len());
        for block in [backtrack, input, lookahead] {
            U16Be::write(&mut ctxt, u16::try_from(block.len())?)?;
            ctxt.write_iter::<U16Be, _>(block.iter().copied())?;
        }
        U16Be::write(&mut ctxt, u16::try_from(records.len())?)?;
        for (position, index) in records {
            U16Be::write(&mut ctxt, position)?;
            U16Be::write(&mut ctxt, index)?;
        }
        for coverage in &coverages {
            Coverage::write(&mut ctxt, coverage)?;
        }
        debug!(
            "chaining subtable of '{}': {}/{}/{} positions, {} bytes",
            ecx.lookup,
            rule.backtrack.len(),
            rule.input.len(),
            rule.lookahead.len(),
            ctxt.len()
        );
        Ok(ctxt.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::read::ReadScope;
    use crate::context::TableKind;
    use crate::error::ResolveError;
    use crate::tests::writer::{self, Field};
    use crate::tests::{encode_with, layout_context};

    fn rule(json: &str) -> ChainingRule {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_lookup_record_shapes() {
        let context = layout_context();
        let rule = rule(
            r#"{
                "input": [["beh.init"], ["beh.medi"], ["noon.fina"]],
                "lookuprecords": [
                    "decomp",
                    { "position": 2, "lookup": "marks" },
                    [0, "decomp"]
                ]
            }"#,
        );
        let compiled = CompiledRule::compile(&rule, &context).unwrap();
        let records: Vec<(u16, &str)> = compiled
            .lookup_records
            .iter()
            .map(|record| (record.position, record.lookup_name.as_str()))
            .collect();
        assert_eq!(records, vec![(0, "decomp"), (2, "marks"), (0, "decomp")]);
    }

    #[test]
    fn test_backtrack_reversed() {
        let mut context = layout_context();
        context.register_lookup(TableKind::Gsub, "decomp").unwrap();
        context.register_lookup(TableKind::Gsub, "shaping").unwrap();
        context.register_lookup(TableKind::Gsub, "test.decomp").unwrap();
        let chaining = ChainingContext::populate(
            &rule(
                r#"{
                    "backtrack": [["hah.isol"], ["beh.init", "beh.medi"]],
                    "input": [["lam.init"]],
                    "lookahead": [["alef.isol"]],
                    "lookuprecords": ["decomp"]
                }"#,
            ),
            &context,
        )
        .unwrap();
        let data = encode_with(&context, TableKind::Gsub, |ecx| chaining.encode(ecx)).unwrap();

        // 4 offsets, 1 record: header is 2 + 3 * 2 + 4 * 2 + 2 + 4 = 22 bytes
        let expected = writer::convert(&[
            Field::UInt16(3),
            Field::UInt16(2),
            Field::UInt16(22), // beh.init, beh.medi
            Field::UInt16(30), // hah.isol
            Field::UInt16(1),
            Field::UInt16(36),
            Field::UInt16(1),
            Field::UInt16(42),
            Field::UInt16(1),
            Field::UInt16(0),
            Field::UInt16(2), // scoped name wins
            Field::Glyphs(&[2, 3]),
            Field::Glyphs(&[4]),
            Field::Glyphs(&[7]),
            Field::Glyphs(&[1]),
        ]);
        assert_eq!(data, expected);

        let coverage = ReadScope::new(&data).offset(30).read::<Coverage>().unwrap();
        assert_eq!(coverage.glyphs(), &[4]);
    }

    #[test]
    fn test_unknown_lookup() {
        let context = layout_context();
        let chaining = ChainingContext::populate(
            &rule(r#"{ "input": [["fatha"]], "lookuprecords": ["nowhere"] }"#),
            &context,
        )
        .unwrap();
        assert_eq!(
            encode_with(&context, TableKind::Gpos, |ecx| chaining.encode(ecx)),
            Err(CompileError::Resolve(ResolveError::UnknownLookup {
                owner: String::from("test"),
                name: String::from("nowhere"),
            }))
        );
    }

    #[test]
    fn test_record_position_past_input() {
        let mut context = layout_context();
        context.register_lookup(TableKind::Gpos, "marks").unwrap();
        let chaining = ChainingContext::populate(
            &rule(r#"{ "input": [["fatha"]], "lookuprecords": [[1, "marks"]] }"#),
            &context,
        )
        .unwrap();
        assert_eq!(
            encode_with(&context, TableKind::Gpos, |ecx| chaining.encode(ecx)),
            Err(CompileError::Write(WriteError::BadValue))
        );
    }
}
