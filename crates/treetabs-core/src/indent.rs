//! Indent recalculation.
//!
//! The indent unit is chosen from the deepest level in the window and the
//! width available to the tab bar. Up to a third of the width may be spent
//! on indentation; past that the unit shrinks, but never below the
//! configured minimum.

use crate::config::IndentConfig;
use crate::navigation::LevelFilter;
use crate::store::TreeStore;

/// Share of the tab bar width usable for indentation, in percent.
const MAX_INDENT_PERCENT: u64 = 33;

/// Indent unit currently in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndentUnit {
    /// The configured base indent fits.
    Auto,
    /// Shrunk to fit the width, in pixels.
    Shrunk(u32),
}

impl IndentUnit {
    /// Pixels per level for this unit.
    #[must_use]
    pub fn pixels(self, base_indent: u32) -> u32 {
        match self {
            IndentUnit::Auto => base_indent,
            IndentUnit::Shrunk(px) => px,
        }
    }
}

/// Level to pixel mapping for one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndentMap {
    unit: IndentUnit,
    px_per_level: u32,
    /// `levels[i]` is the indent of level `i + 1`.
    levels: Vec<u32>,
    fallback: u32,
}

impl IndentMap {
    fn new(unit: IndentUnit, px_per_level: u32, max_level: u32) -> Self {
        let levels = (1..=max_level)
            .map(|level| level.saturating_mul(px_per_level))
            .collect();
        IndentMap {
            unit,
            px_per_level,
            levels,
            fallback: max_level.saturating_add(1).saturating_mul(px_per_level),
        }
    }

    /// Indent of `level` in pixels. Roots are never indented; levels past
    /// the mapped range use the fallback entry.
    #[must_use]
    pub fn indent_for(&self, level: u32) -> u32 {
        if level == 0 {
            return 0;
        }
        self.levels
            .get(level as usize - 1)
            .copied()
            .unwrap_or(self.fallback)
    }

    #[must_use]
    pub fn unit(&self) -> IndentUnit {
        self.unit
    }

    #[must_use]
    pub fn px_per_level(&self) -> u32 {
        self.px_per_level
    }

    /// Deepest level with its own entry.
    #[must_use]
    pub fn max_level(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Entries as `(level, px)` pairs, shallowest first.
    pub fn entries(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.levels
            .iter()
            .enumerate()
            .map(|(i, &px)| (i as u32 + 1, px))
    }
}

/// Memoizing indent calculator for one window.
#[derive(Debug, Clone)]
pub struct IndentCalculator {
    config: IndentConfig,
    unit: IndentUnit,
    last_max_level: Option<u32>,
    map: Option<IndentMap>,
}

impl IndentCalculator {
    #[must_use]
    pub fn new(config: IndentConfig) -> Self {
        IndentCalculator {
            config,
            unit: IndentUnit::Auto,
            last_max_level: None,
            map: None,
        }
    }

    /// Chooses the unit for `max_level` levels in `width` pixels.
    #[must_use]
    pub fn compute_unit(config: &IndentConfig, max_level: u32, width: u32) -> IndentUnit {
        let max_indent = u64::from(width) * MAX_INDENT_PERCENT / 100;
        if max_level == 0 || u64::from(config.base_indent) * u64::from(max_level) <= max_indent {
            return IndentUnit::Auto;
        }
        let fitted = (max_indent / u64::from(max_level))
            .max(u64::from(config.effective_min_indent()))
            .min(u64::from(config.base_indent));
        IndentUnit::Shrunk(u32::try_from(fitted).unwrap_or(config.base_indent))
    }

    /// Recomputes the indent for `store` at `width` pixels.
    ///
    /// Returns the new map, or `None` when neither the unit nor the deciding
    /// level changed and `force` is false.
    pub fn update(&mut self, store: &TreeStore, width: u32, force: bool) -> Option<IndentMap> {
        let filter = LevelFilter {
            only_visible: self.config.auto_shrink_only_for_visible,
        };
        let mut max_level = store.max_level(filter);
        if let Some(cap) = self.config.max_tree_level {
            max_level = max_level.min(cap);
        }

        let unit = Self::compute_unit(&self.config, max_level, width);
        if !force
            && self.map.is_some()
            && unit == self.unit
            && self.last_max_level == Some(max_level)
        {
            tracing::debug!(window = store.window(), max_level, "indent unchanged");
            return None;
        }

        self.unit = unit;
        self.last_max_level = Some(max_level);

        // collapsed tabs get entries too, so expanding never starts from 0
        let map_level = store.max_level(LevelFilter::default());
        let map = IndentMap::new(unit, unit.pixels(self.config.base_indent), map_level);
        tracing::debug!(
            window = store.window(),
            max_level,
            map_level,
            px = map.px_per_level(),
            "indent recomputed"
        );
        self.map = Some(map.clone());
        Some(map)
    }

    /// Last computed map.
    #[must_use]
    pub fn map(&self) -> Option<&IndentMap> {
        self.map.as_ref()
    }

    #[must_use]
    pub fn unit(&self) -> IndentUnit {
        self.unit
    }

    #[must_use]
    pub fn config(&self) -> &IndentConfig {
        &self.config
    }

    /// Level at which `level` is drawn once the configured cap applies.
    #[must_use]
    pub fn display_level(&self, level: u32) -> u32 {
        self.config.max_tree_level.map_or(level, |cap| level.min(cap))
    }

    /// Replaces the settings; the next update recomputes unconditionally.
    pub fn set_config(&mut self, config: IndentConfig) {
        self.config = config;
        self.map = None;
    }
}
