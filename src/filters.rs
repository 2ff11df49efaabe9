//! Named image filters applied to every decoded image before augmentation.
//!
//! Filters are looked up by a fully-qualified name (`module.function`) in a
//! [`FilterRegistry`] when the [`FilterChain`] is built, so a typo in the
//! configuration fails at dataset construction instead of at the first
//! sample.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use image::{DynamicImage, GrayImage, Luma};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{DataError, DataResult};

pub type FilterFn = Arc<dyn Fn(DynamicImage, &FilterParams) -> Result<DynamicImage> + Send + Sync>;

/// Parameters forwarded to a filter alongside the image.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FilterParams {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl From<Value> for FilterParams {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FilterParams::None,
            Value::Array(values) => FilterParams::Positional(values),
            Value::Object(map) => FilterParams::Named(map),
            scalar => FilterParams::Positional(vec![scalar]),
        }
    }
}

impl FilterParams {
    /// Looks a parameter up by position for positional lists, by name for
    /// named mappings.
    pub fn get(&self, position: usize, name: &str) -> Option<&Value> {
        match self {
            FilterParams::None => None,
            FilterParams::Positional(values) => values.get(position),
            FilterParams::Named(map) => map.get(name),
        }
    }

    pub fn get_f32(&self, position: usize, name: &str) -> Result<f32> {
        let value = self
            .get(position, name)
            .ok_or_else(|| anyhow!("missing parameter `{}` (position {})", name, position))?;
        value
            .as_f64()
            .map(|v| v as f32)
            .ok_or_else(|| anyhow!("parameter `{}` must be a number, got {}", name, value))
    }

    pub fn get_i32(&self, position: usize, name: &str) -> Result<i32> {
        Ok(self.get_f32(position, name)?.round() as i32)
    }
}

/// One `{"module.function": params}` configuration entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct FilterEntry {
    pub name: String,
    pub params: FilterParams,
}

impl FilterEntry {
    pub fn new(name: impl Into<String>, params: FilterParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl TryFrom<Map<String, Value>> for FilterEntry {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(format!(
                "filter entry must have exactly one `module.function` key, got {}",
                map.len()
            ));
        }
        let (name, params) = map
            .into_iter()
            .next()
            .ok_or_else(|| "empty filter entry".to_string())?;
        Ok(Self {
            name,
            params: params.into(),
        })
    }
}

/// Maps fully-qualified filter names to functions.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, FilterFn>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the `imageops.*` filters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("imageops.blur", |img, p| Ok(img.blur(p.get_f32(0, "sigma")?)));
        registry.register("imageops.unsharpen", |img, p| {
            Ok(img.unsharpen(p.get_f32(0, "sigma")?, p.get_i32(1, "threshold")?))
        });
        registry.register("imageops.brighten", |img, p| {
            Ok(img.brighten(p.get_i32(0, "value")?))
        });
        registry.register("imageops.contrast", |img, p| {
            Ok(img.adjust_contrast(p.get_f32(0, "contrast")?))
        });
        registry.register("imageops.huerotate", |img, p| {
            Ok(img.huerotate(p.get_i32(0, "degrees")?))
        });
        registry.register("imageops.grayscale", |img, _| Ok(img.grayscale()));
        registry.register("imageops.invert", |mut img, _| {
            img.invert();
            Ok(img)
        });
        registry.register("imageops.threshold", |img, p| {
            threshold(&img, p.get_f32(0, "level")?)
        });
        registry.register("imageops.fliph", |img, _| Ok(img.fliph()));
        registry.register("imageops.flipv", |img, _| Ok(img.flipv()));
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(DynamicImage, &FilterParams) -> Result<DynamicImage> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(function));
    }

    pub fn resolve(&self, name: &str) -> Option<FilterFn> {
        self.filters.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn threshold(img: &DynamicImage, level: f32) -> Result<DynamicImage> {
    let gray = img.to_luma8();
    let binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] as f32 > level {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    Ok(DynamicImage::ImageLuma8(binary))
}

struct ResolvedFilter {
    name: String,
    function: FilterFn,
    params: FilterParams,
}

/// Ordered, resolved filter list. Empty chain is the identity.
#[derive(Default)]
pub struct FilterChain {
    steps: Vec<ResolvedFilter>,
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|s| (&s.name, &s.params)))
            .finish()
    }
}

impl FilterChain {
    pub fn build(entries: &[FilterEntry], registry: &FilterRegistry) -> DataResult<Self> {
        if !entries.is_empty() {
            info!(count = entries.len(), "loading filters");
        }
        let mut steps = Vec::with_capacity(entries.len());
        for entry in entries {
            let function = registry.resolve(&entry.name).ok_or_else(|| {
                DataError::config(format!(
                    "unknown filter `{}` (registered: {})",
                    entry.name,
                    registry.names().join(", ")
                ))
            })?;
            debug!(filter = %entry.name, params = ?entry.params, "resolved filter");
            steps.push(ResolvedFilter {
                name: entry.name.clone(),
                function,
                params: entry.params.clone(),
            });
        }
        Ok(Self { steps })
    }

    pub fn apply(&self, image: DynamicImage) -> DataResult<DynamicImage> {
        let mut image = image;
        for step in &self.steps {
            image = (step.function)(image, &step.params).map_err(|e| DataError::Filter {
                name: step.name.clone(),
                message: format!("{:#}", e),
            })?;
        }
        Ok(image)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gradient() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(4, 4, |x, y| Luma([(x * 40 + y * 10) as u8])))
    }

    #[test]
    fn test_entry_from_json() {
        let entries: Vec<FilterEntry> = serde_json::from_value(json!([
            {"imageops.blur": [2.0]},
            {"imageops.contrast": {"contrast": 5.0}},
            {"imageops.invert": null}
        ]))
        .unwrap();
        assert_eq!(entries[0].params, FilterParams::Positional(vec![json!(2.0)]));
        assert_eq!(entries[1].params.get(0, "contrast"), Some(&json!(5.0)));
        assert_eq!(entries[2].params, FilterParams::None);
    }

    #[test]
    fn test_entry_rejects_multiple_keys() {
        let parsed: Result<FilterEntry, _> =
            serde_json::from_value(json!({"imageops.blur": [1.0], "imageops.invert": null}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_unknown_filter_fails_at_build() {
        let registry = FilterRegistry::with_builtins();
        let entries = vec![FilterEntry::new("imageops.sharpen_everything", FilterParams::None)];
        let err = FilterChain::build(&entries, &registry).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = FilterChain::build(&[], &FilterRegistry::with_builtins()).unwrap();
        assert!(chain.is_empty());
        let img = gradient();
        let out = chain.apply(img.clone()).unwrap();
        assert_eq!(out.as_bytes(), img.as_bytes());
    }

    #[test]
    fn test_chain_applies_in_order() {
        let mut registry = FilterRegistry::new();
        registry.register("test.add", |img, p| {
            let amount = p.get_f32(0, "amount")? as u8;
            let mut gray = img.to_luma8();
            for px in gray.pixels_mut() {
                px[0] = px[0].saturating_add(amount);
            }
            Ok(DynamicImage::ImageLuma8(gray))
        });
        registry.register("test.double", |img, _| {
            let mut gray = img.to_luma8();
            for px in gray.pixels_mut() {
                px[0] = px[0].saturating_mul(2);
            }
            Ok(DynamicImage::ImageLuma8(gray))
        });
        let entries = vec![
            FilterEntry::new("test.add", FilterParams::Positional(vec![json!(3)])),
            FilterEntry::new("test.double", FilterParams::None),
        ];
        let chain = FilterChain::build(&entries, &registry).unwrap();
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([1])));
        let out = chain.apply(img).unwrap().to_luma8();
        // (1 + 3) * 2, not 1 * 2 + 3
        assert!(out.pixels().all(|p| p[0] == 8));
    }

    #[test]
    fn test_named_params_and_missing_param() {
        let registry = FilterRegistry::with_builtins();
        let named = vec![FilterEntry::new(
            "imageops.threshold",
            FilterParams::Named(Map::from_iter([("level".to_string(), json!(50))])),
        )];
        let out = FilterChain::build(&named, &registry)
            .unwrap()
            .apply(gradient())
            .unwrap()
            .to_luma8();
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(3, 3)[0], 255);

        let missing = vec![FilterEntry::new("imageops.blur", FilterParams::None)];
        let err = FilterChain::build(&missing, &registry)
            .unwrap()
            .apply(gradient())
            .unwrap_err();
        assert!(matches!(err, DataError::Filter { ref name, .. } if name == "imageops.blur"));
    }
}
