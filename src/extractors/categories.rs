use super::bindings::{apply_harvest_type_enum, build_base_sandbox};
use super::{Category, CategoryExtractor, MiningContext};
use crate::sandbox::Sandbox;

pub struct Plants;

impl CategoryExtractor for Plants {
    fn category(&self) -> Category {
        Category::Plants
    }

    fn signatures(&self) -> &[&'static str] {
        &["seed:{tileRef", "plant:{tileRef", "crop:{tileRef"]
    }

    fn build_sandbox(&self, bundle: &str, literal: &str, ctx: &MiningContext) -> Sandbox {
        let mut sandbox = build_base_sandbox(bundle, literal, ctx);
        apply_harvest_type_enum(&mut sandbox, bundle, literal, ctx);
        sandbox
    }
}

/// Categories that need nothing beyond the base sandbox.
macro_rules! base_extractor {
    ($name:ident, $category:expr, [$($sig:expr),+ $(,)?]) => {
        pub struct $name;

        impl CategoryExtractor for $name {
            fn category(&self) -> Category {
                $category
            }

            fn signatures(&self) -> &[&'static str] {
                &[$($sig),+]
            }

            fn build_sandbox(&self, bundle: &str, literal: &str, ctx: &MiningContext) -> Sandbox {
                build_base_sandbox(bundle, literal, ctx)
            }
        }
    };
}

base_extractor!(Pets, Category::Pets, ["coinsToFullyReplenishHunger", "innateAbilityWeights", "hoursToMature"]);
base_extractor!(Items, Category::Items, ["maxInventoryQuantity", "isOneTimePurchase", "grantedMutation"]);
base_extractor!(Decor, Category::Decor, ["baseTileScale", "isOneTimePurchase", "rotationVariants"]);
base_extractor!(Eggs, Category::Eggs, ["secondsToHatch", "faunaSpawnWeights", "coinPrice"]);
base_extractor!(Abilities, Category::Abilities, ["trigger:\"continuous\"", "baseProbability", "baseParameters:{"]);
base_extractor!(Mutations, Category::Mutations, ["coinMultiplier", "baseChance", "name:\"Gold\""]);
base_extractor!(Weathers, Category::Weathers, ["mutator:{mutation:"]);
