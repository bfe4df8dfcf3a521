//! Variant set listing and selection.

use serde::Serialize;

use crate::compose::ComposedStage;
use crate::error::{SceneError, SceneResult};
use crate::stage::Stage;

/// A variant set as declared on a composed prim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VariantSet {
    pub name: String,
    /// Options in declaration order
    pub options: Vec<String>,
    /// Current selection, always one of `options` when set
    pub selected: Option<String>,
}

/// Variant sets declared on one prim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PrimVariants {
    pub path: String,
    pub variant_sets: Vec<VariantSet>,
}

/// Outcome of a successful selection change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VariantChange {
    pub path: String,
    pub variant_set: String,
    pub previous: Option<String>,
    pub selected: String,
}

/// List variant sets of `prim_path`, or of every prim declaring any.
pub fn list_variants(
    stage: &ComposedStage,
    prim_path: Option<&str>,
) -> SceneResult<Vec<PrimVariants>> {
    let describe = |path: &str, sets: &[VariantSet]| PrimVariants {
        path: path.to_string(),
        variant_sets: sets.to_vec(),
    };

    match prim_path {
        Some(path) => {
            let prim = stage
                .prim(path)
                .ok_or_else(|| SceneError::PrimNotFound(path.to_string()))?;
            Ok(vec![describe(&prim.path, &prim.variant_sets)])
        }
        None => Ok(stage
            .iter()
            .filter(|(_, prim)| !prim.variant_sets.is_empty())
            .map(|(_, prim)| describe(&prim.path, &prim.variant_sets))
            .collect()),
    }
}

impl Stage {
    /// Select `option` in variant set `set_name` of the prim at `prim_path`.
    ///
    /// Validates everything before touching the layer, so a failed call
    /// leaves all selections as they were. A successful change drops the
    /// composed view; the next read recomposes with the new selection.
    pub fn set_variant(
        &mut self,
        prim_path: &str,
        set_name: &str,
        option: &str,
    ) -> SceneResult<VariantChange> {
        let composed = self.composed();
        let prim = composed
            .prim(prim_path)
            .ok_or_else(|| SceneError::PrimNotFound(prim_path.to_string()))?;

        let set = prim
            .variant_set(set_name)
            .ok_or_else(|| SceneError::UnknownVariantSet {
                prim: prim_path.to_string(),
                set: set_name.to_string(),
            })?;

        if !set.options.iter().any(|o| o == option) {
            return Err(SceneError::UnknownVariantOption {
                prim: prim_path.to_string(),
                set: set_name.to_string(),
                option: option.to_string(),
                available: set.options.clone(),
            });
        }

        let change = VariantChange {
            path: prim_path.to_string(),
            variant_set: set_name.to_string(),
            previous: set.selected.clone(),
            selected: option.to_string(),
        };

        if change.previous.as_deref() == Some(option) {
            log::debug!("{}: {} already selects {}", prim_path, set_name, option);
            return Ok(change);
        }

        let spec = prim
            .selection_address
            .resolve_mut(self.layer_mut())
            .ok_or_else(|| SceneError::PrimNotFound(prim_path.to_string()))?;
        spec.metadata
            .variant_selection
            .insert(set_name.to_string(), option.to_string());
        self.invalidate();

        log::info!(
            "{}: variant {} {} -> {}",
            prim_path,
            set_name,
            change.previous.as_deref().unwrap_or("<none>"),
            option
        );
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usd::load_usda_from_string;

    const CONFIGURATOR: &str = r#"
def Xform "Product" (
    variants = {
        string color = "red"
    }
)
{
    def Mesh "Body"
    {
    }

    variantSet "color" = {
        "red" {
            def Mesh "RedTrim"
            {
            }
        }
        "blue" {
            def Mesh "BlueTrim"
            {
            }
            def Mesh "BlueBadge"
            {
            }
        }
    }
    variantSet "finish" = {
        "matte" {
        }
        "gloss" {
        }
    }
}
"#;

    fn stage() -> Stage {
        load_usda_from_string(CONFIGURATOR, "configurator.usda").unwrap()
    }

    #[test]
    fn test_list_all_variants() {
        let stage = stage();
        let listing = list_variants(&stage.composed(), None).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].path, "/Product");

        let color = &listing[0].variant_sets[0];
        assert_eq!(color.name, "color");
        assert_eq!(color.options, vec!["red".to_string(), "blue".to_string()]);
        assert_eq!(color.selected.as_deref(), Some("red"));
        assert_eq!(listing[0].variant_sets[1].selected, None);
    }

    #[test]
    fn test_list_variants_missing_prim() {
        let stage = stage();
        let err = list_variants(&stage.composed(), Some("/Nope")).unwrap_err();
        assert!(matches!(err, SceneError::PrimNotFound(_)));
    }

    #[test]
    fn test_set_variant_swaps_subtree() {
        let mut stage = stage();
        assert!(stage.composed().find("/Product/RedTrim").is_some());

        let change = stage.set_variant("/Product", "color", "blue").unwrap();
        assert_eq!(change.previous.as_deref(), Some("red"));
        assert_eq!(change.selected, "blue");

        let composed = stage.composed();
        assert!(composed.find("/Product/RedTrim").is_none());
        assert!(composed.find("/Product/BlueTrim").is_some());
        assert!(composed.find("/Product/BlueBadge").is_some());
    }

    #[test]
    fn test_unknown_option_leaves_selection() {
        let mut stage = stage();
        let err = stage.set_variant("/Product", "color", "green").unwrap_err();
        match err {
            SceneError::UnknownVariantOption { option, available, .. } => {
                assert_eq!(option, "green");
                assert_eq!(available, vec!["red".to_string(), "blue".to_string()]);
            }
            other => panic!("Expected UnknownVariantOption, got {:?}", other),
        }

        let listing = list_variants(&stage.composed(), Some("/Product")).unwrap();
        assert_eq!(listing[0].variant_sets[0].selected.as_deref(), Some("red"));
    }

    #[test]
    fn test_unknown_set() {
        let mut stage = stage();
        let err = stage.set_variant("/Product", "size", "small").unwrap_err();
        assert!(matches!(err, SceneError::UnknownVariantSet { .. }));
    }

    #[test]
    fn test_sets_are_independent() {
        let mut stage = stage();
        stage.set_variant("/Product", "finish", "gloss").unwrap();

        let composed = stage.composed();
        let product = composed.prim("/Product").unwrap();
        assert_eq!(product.variant_set("color").unwrap().selected.as_deref(), Some("red"));
        assert_eq!(product.variant_set("finish").unwrap().selected.as_deref(), Some("gloss"));
    }
}
