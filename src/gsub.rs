//! Glyph substitution (`gsub`) subtables.
//!
//! > The Glyph Substitution (GSUB) table provides data for substition of glyphs for appropriate
//! > rendering of scripts, such as cursively-connecting forms in Arabic script, or for advanced
//! > typographic effects, such as ligatures.
//!
//! <https://docs.microsoft.com/en-us/typography/opentype/spec/gsub>
//!
//! Besides the standard single, multiple and ligature substitutions this module encodes two
//! elongation-aware single substitution formats. They carry, for each substituted glyph, the
//! tatweel values the substitute should be drawn with (format 11) or the full description of
//! how far it may stretch and shrink (format 10). When a standard font is built they are
//! converted to single substitution format 2 by substituting the matching alternate glyph.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::binary::write::{offset16, WriteBinary, WriteBuffer, WriteContext};
use crate::binary::{Fixed, U16Be, U32Be};
use crate::context::LayoutContext;
use crate::error::{AxisBoundsError, AxisField, CompileError};
use crate::glyph::GlyphId;
use crate::layout::coverage::Coverage;
use crate::layout::EncodeContext;
use crate::variations::{normalize, AxisLimits};

/// Substitutions by glyph name, `{ "glyph": "substitute" }`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct SingleSubstRule {
    pub substitutions: IndexMap<String, String>,
}

/// How a glyph may be elongated.
#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlyphExpansion {
    pub min_left_tatweel: f64,
    pub max_left_tatweel: f64,
    pub min_right_tatweel: f64,
    pub max_right_tatweel: f64,
    pub weight: u16,
    /// Position of the glyph within a ligature, three bits.
    pub start_end_lig: u8,
    pub stretch_is_absolute: bool,
    pub shrink_is_absolute: bool,
}

impl GlyphExpansion {
    pub fn flags(&self) -> u32 {
        u32::from(self.start_end_lig & 0x7)
            | u32::from(self.stretch_is_absolute) << 3
            | u32::from(self.shrink_is_absolute) << 4
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ElongationEntry {
    pub substitute: String,
    #[serde(flatten)]
    pub expansion: GlyphExpansion,
}

/// Elongating substitutions by glyph name.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct ElongationSubstRule {
    pub substitutions: IndexMap<String, ElongationEntry>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SingleSubstFormat {
    /// Single substitution format 2.
    Substitute,
    /// Substitute plus the tatweel values to draw it with (extended format 11).
    WithTatweel,
    /// Substitute plus its elongation limits, weight and flags (extended format 10).
    WithExpansion,
}

impl SingleSubstFormat {
    pub fn format(self) -> u16 {
        match self {
            SingleSubstFormat::Substitute => 2,
            SingleSubstFormat::WithTatweel => 11,
            SingleSubstFormat::WithExpansion => 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SingleSubst {
    format: SingleSubstFormat,
    substitutions: BTreeMap<GlyphId, GlyphId>,
    expansions: BTreeMap<GlyphId, GlyphExpansion>,
}

impl SingleSubst {
    pub fn populate(rule: &SingleSubstRule, context: &LayoutContext) -> Result<SingleSubst, CompileError> {
        let mut substitutions = BTreeMap::new();
        for (glyph, substitute) in &rule.substitutions {
            substitutions.insert(context.glyph_id(glyph)?, context.glyph_id(substitute)?);
        }
        Ok(SingleSubst {
            format: SingleSubstFormat::Substitute,
            substitutions,
            expansions: BTreeMap::new(),
        })
    }

    pub fn populate_elongation(
        format: SingleSubstFormat,
        rule: &ElongationSubstRule,
        context: &LayoutContext,
    ) -> Result<SingleSubst, CompileError> {
        let mut substitutions = BTreeMap::new();
        let mut expansions = BTreeMap::new();
        for (glyph, entry) in &rule.substitutions {
            let glyph = context.glyph_id(glyph)?;
            substitutions.insert(glyph, context.glyph_id(&entry.substitute)?);
            expansions.insert(glyph, entry.expansion);
        }
        Ok(SingleSubst {
            format,
            substitutions,
            expansions,
        })
    }

    pub fn format(&self) -> SingleSubstFormat {
        self.format
    }

    pub fn is_extended(&self) -> bool {
        self.format != SingleSubstFormat::Substitute
    }

    pub fn substitutions(&self) -> impl Iterator<Item = (GlyphId, GlyphId)> + '_ {
        self.substitutions.iter().map(|(&glyph, &substitute)| (glyph, substitute))
    }

    pub fn encode(&self, ecx: &mut EncodeContext<'_>) -> Result<Vec<u8>, CompileError> {
        let mut ctxt = WriteBuffer::new();
        match self.format {
            SingleSubstFormat::Substitute => {
                write_substitutes(&mut ctxt, self.substitutions.iter().map(|(&g, &s)| (g, s)))?
            }
            _ if !ecx.layout.options.extended => {
                let converted = self.converted(ecx.layout)?;
                write_substitutes(&mut ctxt, converted.into_iter())?
            }
            SingleSubstFormat::WithTatweel | SingleSubstFormat::WithExpansion => {
                self.write_extended(&mut ctxt, ecx.layout)?
            }
        }
        Ok(ctxt.into_inner())
    }

    // Substitute the alternate that matches the elongation: the minimum tatweel values for
    // WithTatweel, the maximum ones for WithExpansion.
    fn converted(&self, context: &LayoutContext) -> Result<Vec<(GlyphId, GlyphId)>, CompileError> {
        let mut pairs = Vec::with_capacity(self.substitutions.len());
        for (&glyph, &substitute) in &self.substitutions {
            let expansion = self.expansions.get(&glyph).copied().unwrap_or_default();
            let (left, right) = match self.format {
                SingleSubstFormat::WithExpansion => {
                    (expansion.max_left_tatweel, expansion.max_right_tatweel)
                }
                _ => (expansion.min_left_tatweel, expansion.min_right_tatweel),
            };
            let substitute = if left != 0.0 || right != 0.0 {
                context.shape(substitute, left, right)?.glyph_id
            } else {
                substitute
            };
            pairs.push((glyph, substitute));
        }
        debug!("converted {} elongation substitutions to format 2", pairs.len());
        Ok(pairs)
    }

    fn write_extended<C: WriteContext>(&self, ctxt: &mut C, context: &LayoutContext) -> Result<(), CompileError> {
        let start = ctxt.bytes_written();
        U16Be::write(ctxt, self.format.format())?;
        let coverage_offset = ctxt.placeholder::<U16Be, _>()?;
        U16Be::write(ctxt, u16::try_from(self.substitutions.len())?)?;
        for (&glyph, &substitute) in &self.substitutions {
            let expansion = self.expansions.get(&glyph).copied().unwrap_or_default();
            U16Be::write(ctxt, substitute)?;
            let values = TatweelValues::new(context, substitute)?;
            match self.format {
                SingleSubstFormat::WithTatweel => {
                    Fixed::write(ctxt, values.tatweel(AxisField::MinLeft, expansion.min_left_tatweel)?)?;
                    Fixed::write(ctxt, values.tatweel(AxisField::MinRight, expansion.min_right_tatweel)?)?;
                }
                _ => {
                    Fixed::write(ctxt, values.limit(AxisField::MinLeft, expansion.min_left_tatweel)?)?;
                    Fixed::write(ctxt, values.limit(AxisField::MaxLeft, expansion.max_left_tatweel)?)?;
                    Fixed::write(ctxt, values.limit(AxisField::MinRight, expansion.min_right_tatweel)?)?;
                    Fixed::write(ctxt, values.limit(AxisField::MaxRight, expansion.max_right_tatweel)?)?;
                    U16Be::write(ctxt, expansion.weight)?;
                    U32Be::write(ctxt, expansion.flags())?;
                }
            }
        }
        ctxt.write_placeholder(coverage_offset, offset16(ctxt, start)?)?;
        Coverage::write(ctxt, &Coverage::new(self.substitutions.keys().copied()))?;
        Ok(())
    }
}

/// Encodes the tatweel values of one substitute glyph.
struct TatweelValues<'a> {
    context: &'a LayoutContext,
    glyph: &'a str,
    limits: AxisLimits,
}

impl<'a> TatweelValues<'a> {
    fn new(context: &'a LayoutContext, substitute: GlyphId) -> Result<TatweelValues<'a>, CompileError> {
        let glyph = context.glyph_name(substitute)?;
        Ok(TatweelValues {
            context,
            glyph,
            limits: context.axis_limits.limits_or_default(glyph),
        })
    }

    /// A tatweel value, anywhere within the glyph's range on that side.
    fn tatweel(&self, field: AxisField, value: f64) -> Result<Fixed, CompileError> {
        let (min, max) = side(field);
        let low = self.limits.get(min).min(0.0);
        let high = self.limits.get(max).max(0.0);
        self.encode(field, value, low, high)
    }

    /// A stretch or shrink limit, which must not cross zero.
    fn limit(&self, field: AxisField, value: f64) -> Result<Fixed, CompileError> {
        let (low, high) = match field {
            AxisField::MinLeft | AxisField::MinRight => (self.limits.get(field), 0.0),
            AxisField::MaxLeft | AxisField::MaxRight => (0.0, self.limits.get(field)),
        };
        self.encode(field, value, low, high)
    }

    fn encode(&self, field: AxisField, value: f64, low: f64, high: f64) -> Result<Fixed, CompileError> {
        if !self.context.options.use_normalized_axis_values {
            return Ok(Fixed::try_from(value)?);
        }
        if value < low || value > high {
            return Err(AxisBoundsError {
                glyph: self.glyph.to_owned(),
                field,
                value,
                bound: if value < low { low } else { high },
            }
            .into());
        }
        let (min, max) = side(field);
        let bound_field = if value < 0.0 { min } else { max };
        let bound = self
            .context
            .axis_limits
            .normalization_bound(bound_field, &self.limits);
        Ok(Fixed::try_from(normalize(value, bound))?)
    }
}

// The minimum and maximum fields of the axis `field` belongs to
fn side(field: AxisField) -> (AxisField, AxisField) {
    match field {
        AxisField::MinLeft | AxisField::MaxLeft => (AxisField::MinLeft, AxisField::MaxLeft),
        AxisField::MinRight | AxisField::MaxRight => (AxisField::MinRight, AxisField::MaxRight),
    }
}

fn write_substitutes<C: WriteContext>(
    ctxt: &mut C,
    pairs: impl ExactSizeIterator<Item = (GlyphId, GlyphId)> + Clone,
) -> Result<(), CompileError> {
    let start = ctxt.bytes_written();
    U16Be::write(ctxt, 2u16)?; // format
    let coverage_offset = ctxt.placeholder::<U16Be, _>()?;
    U16Be::write(ctxt, u16::try_from(pairs.len())?)?;
    ctxt.write_iter::<U16Be, _>(pairs.clone().map(|(_, substitute)| substitute))?;
    ctxt.write_placeholder(coverage_offset, offset16(ctxt, start)?)?;
    Coverage::write(ctxt, &Coverage::new(pairs.map(|(glyph, _)| glyph)))?;
    Ok(())
}

/// One-to-many substitutions by glyph name, `{ "glyph": ["first", "second", ...] }`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct MultipleSubstRule {
    pub substitutions: IndexMap<String, Vec<String>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MultipleSubst {
    sequences: BTreeMap<GlyphId, Vec<GlyphId>>,
}

impl MultipleSubst {
    pub fn populate(rule: &MultipleSubstRule, context: &LayoutContext) -> Result<MultipleSubst, CompileError> {
        let mut sequences = BTreeMap::new();
        for (glyph, sequence) in &rule.substitutions {
            let sequence = sequence
                .iter()
                .map(|name| context.glyph_id(name))
                .collect::<Result<Vec<_>, _>>()?;
            sequences.insert(context.glyph_id(glyph)?, sequence);
        }
        Ok(MultipleSubst { sequences })
    }

    pub fn encode(&self, _ecx: &mut EncodeContext<'_>) -> Result<Vec<u8>, CompileError> {
        let mut ctxt = WriteBuffer::new();
        U16Be::write(&mut ctxt, 1u16)?; // format
        let coverage_offset = ctxt.placeholder::<U16Be, _>()?;
        U16Be::write(&mut ctxt, u16::try_from(self.sequences.len())?)?;
        let sequence_offsets = ctxt.placeholder_array::<U16Be, _>(self.sequences.len())?;

        ctxt.write_placeholder(coverage_offset, offset16(&ctxt, 0)?)?;
        Coverage::write(&mut ctxt, &Coverage::new(self.sequences.keys().copied()))?;

        // Sequence tables follow in coverage order
        for (sequence, placeholder) in self.sequences.values().zip(sequence_offsets) {
            ctxt.write_placeholder(placeholder, offset16(&ctxt, 0)?)?;
            U16Be::write(&mut ctxt, u16::try_from(sequence.len())?)?;
            ctxt.write_iter::<U16Be, _>(sequence.iter().copied())?;
        }
        Ok(ctxt.into_inner())
    }
}

/// Ligatures by ligature glyph name, `{ "ligature": ["first", "second", ...] }`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct LigatureRule {
    pub ligatures: IndexMap<String, Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ligature {
    pub ligature_glyph: GlyphId,
    pub component_glyphs: Vec<GlyphId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LigatureSubst {
    ligatures: Vec<Ligature>,
}

impl LigatureSubst {
    pub fn populate(rule: &LigatureRule, context: &LayoutContext) -> Result<LigatureSubst, CompileError> {
        let mut ligatures = Vec::with_capacity(rule.ligatures.len());
        for (ligature, components) in &rule.ligatures {
            if components.is_empty() {
                warn!("ligature '{}' has no components, skipping", ligature);
                continue;
            }
            let component_glyphs = components
                .iter()
                .map(|name| context.glyph_id(name))
                .collect::<Result<Vec<_>, _>>()?;
            ligatures.push(Ligature {
                ligature_glyph: context.glyph_id(ligature)?,
                component_glyphs,
            });
        }
        Ok(LigatureSubst { ligatures })
    }

    pub fn ligatures(&self) -> &[Ligature] {
        &self.ligatures
    }

    /// Ligatures grouped by first component, in declaration order within each group.
    pub fn ligature_sets(&self) -> BTreeMap<GlyphId, Vec<&Ligature>> {
        let mut sets: BTreeMap<GlyphId, Vec<&Ligature>> = BTreeMap::new();
        for ligature in &self.ligatures {
            if let Some(&first) = ligature.component_glyphs.first() {
                sets.entry(first).or_default().push(ligature);
            }
        }
        sets
    }

    pub fn encode(&self, _ecx: &mut EncodeContext<'_>) -> Result<Vec<u8>, CompileError> {
        let sets = self.ligature_sets();
        let mut ctxt = WriteBuffer::new();
        U16Be::write(&mut ctxt, 1u16)?; // format
        let coverage_offset = ctxt.placeholder::<U16Be, _>()?;
        U16Be::write(&mut ctxt, u16::try_from(sets.len())?)?;
        let set_offsets = ctxt.placeholder_array::<U16Be, _>(sets.len())?;

        ctxt.write_placeholder(coverage_offset, offset16(&ctxt, 0)?)?;
        Coverage::write(&mut ctxt, &Coverage::new(sets.keys().copied()))?;

        for (ligatures, placeholder) in sets.values().zip(set_offsets) {
            let set_start = ctxt.bytes_written();
            ctxt.write_placeholder(placeholder, offset16(&ctxt, 0)?)?;
            U16Be::write(&mut ctxt, u16::try_from(ligatures.len())?)?;
            let ligature_offsets = ctxt.placeholder_array::<U16Be, _>(ligatures.len())?;
            for (ligature, placeholder) in ligatures.iter().zip(ligature_offsets) {
                ctxt.write_placeholder(placeholder, offset16(&ctxt, set_start)?)?;
                U16Be::write(&mut ctxt, ligature.ligature_glyph)?;
                U16Be::write(&mut ctxt, u16::try_from(ligature.component_glyphs.len())?)?;
                ctxt.write_iter::<U16Be, _>(ligature.component_glyphs[1..].iter().copied())?;
            }
        }
        Ok(ctxt.into_inner())
    }
}
