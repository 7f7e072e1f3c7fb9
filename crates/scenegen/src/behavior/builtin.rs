use super::{
    store_field, BehaviorCatalog, BehaviorDescriptor, BehaviorInstance, FieldSchema, FieldValue,
};

use super::ComponentKind::{Body, Transform, Ui, Visual};
use super::FieldKind::{Bool, ComponentRef, EntityRef, Float, Int, LayerMask, Text, Vector2, Vector3};

pub const BUILTIN_MODULE: &str = "builtin";

/// Platformer behaviors a generated document usually references.
pub fn builtin_catalog() -> BehaviorCatalog {
    BehaviorCatalog::new(
        BUILTIN_MODULE,
        vec![
            BehaviorDescriptor::new(
                "PlayerController",
                vec![
                    FieldSchema::new("moveSpeed", Float),
                    FieldSchema::new("jumpForce", Float),
                    FieldSchema::new("maxJumps", Int),
                    FieldSchema::new("groundMask", LayerMask),
                    FieldSchema::new("groundCheck", ComponentRef(Transform)),
                    FieldSchema::new("groundCheckRadius", Float),
                    FieldSchema::new("body", ComponentRef(Body)),
                    FieldSchema::new("spriteRenderer", ComponentRef(Visual)),
                ],
            )
            .with_binder(non_negative_numbers),
            BehaviorDescriptor::new(
                "PatrolEnemy",
                vec![
                    FieldSchema::new("speed", Float),
                    FieldSchema::new("patrolDistance", Float),
                    FieldSchema::new("damage", Int),
                    FieldSchema::new("startFacingRight", Bool),
                    FieldSchema::new("groundMask", LayerMask),
                    FieldSchema::new("groundCheck", ComponentRef(Transform)),
                    FieldSchema::new("body", ComponentRef(Body)),
                ],
            )
            .with_binder(non_negative_numbers),
            BehaviorDescriptor::new(
                "Collectible",
                vec![
                    FieldSchema::new("scoreValue", Int),
                    FieldSchema::new("collectorTag", Text),
                    FieldSchema::new("spinSpeed", Float),
                ],
            ),
            BehaviorDescriptor::new(
                "Hazard",
                vec![
                    FieldSchema::new("damage", Int),
                    FieldSchema::new("respawnPoint", EntityRef),
                    FieldSchema::new("knockback", Vector2),
                ],
            )
            .with_binder(non_negative_numbers),
            BehaviorDescriptor::new(
                "CameraFollow",
                vec![
                    FieldSchema::new("target", ComponentRef(Transform)),
                    FieldSchema::new("offset", Vector3),
                    FieldSchema::new("smoothTime", Float),
                    FieldSchema::new("minBounds", Vector2),
                    FieldSchema::new("maxBounds", Vector2),
                ],
            )
            .with_binder(non_negative_numbers),
            BehaviorDescriptor::new(
                "ScoreDisplay",
                vec![
                    FieldSchema::new("prefix", Text),
                    FieldSchema::new("label", ComponentRef(Ui)),
                ],
            ),
            BehaviorDescriptor::new(
                "GameManager",
                vec![
                    FieldSchema::new("startingLives", Int),
                    FieldSchema::new("nextScene", Text),
                    FieldSchema::new("player", EntityRef),
                    FieldSchema::new("scoreDisplay", EntityRef),
                ],
            )
            .with_binder(non_negative_numbers),
        ],
    )
}

/// Rejects negative speeds, counts and damage; everything else is stored as given.
fn non_negative_numbers(
    instance: &mut BehaviorInstance,
    schema: &FieldSchema,
    value: FieldValue,
) -> Result<(), String> {
    let negative = match value {
        FieldValue::Int(raw) => raw < 0,
        FieldValue::Float(raw) => raw < 0.0,
        _ => false,
    };
    if negative {
        return Err(format!("{} must not be negative", schema.name));
    }
    store_field(instance, schema, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_are_unique() {
        let catalog = builtin_catalog();
        let mut names = catalog
            .descriptors
            .iter()
            .map(|descriptor| descriptor.name)
            .collect::<Vec<_>>();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, 7);
    }

    #[test]
    fn negative_speed_is_rejected_by_binder() {
        let catalog = builtin_catalog();
        let player = &catalog.descriptors[0];
        let mut instance = BehaviorInstance::new(BUILTIN_MODULE, player);
        let schema = player.field("moveSpeed").expect("field");
        let err = (player.bind)(&mut instance, schema, FieldValue::Float(-2.0)).expect_err("negative");
        assert!(err.contains("moveSpeed"));
        assert!(!instance.is_set("moveSpeed"));
        (player.bind)(&mut instance, schema, FieldValue::Float(6.5)).expect("positive");
        assert_eq!(instance.get("moveSpeed"), Some(&FieldValue::Float(6.5)));
    }
}
