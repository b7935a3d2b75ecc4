use datablock_model::{
    ActionData, AssignError, DeclShape, Entity, EntityData, EntityLookup, PointerPoll,
    PropertyBag, PropertyGroup, PropertyKind, SchemaError, SchemaRegistry, StructBuilder,
    StructClass, Value,
};
use datablock_types::{EntityId, IdKind, LibraryId};
use pretty_assertions::assert_eq;

struct Entities(Vec<Entity>);

impl EntityLookup for Entities {
    fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.0.iter().find(|e| e.id == id)
    }

    fn find(&self, kind: IdKind, name: &str, library: Option<LibraryId>) -> Option<&Entity> {
        self.0
            .iter()
            .find(|e| e.kind == kind && e.name == name && e.library == library)
    }
}

fn registry_with_group(name: &str) -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register_struct(name, StructClass::PropertyGroup)
        .unwrap();
    registry
}

// ── Built-ins ────────────────────────────────────────────────────

#[test]
fn builtin_pointers_are_registered() {
    let registry = SchemaRegistry::new();
    assert_eq!(
        registry.lookup("Object", "parent").unwrap().shape,
        DeclShape::EntityPointer(IdKind::Object)
    );
    assert_eq!(
        registry.lookup("Scene", "camera").unwrap().shape,
        DeclShape::EntityPointer(IdKind::Object)
    );
    let action = registry.lookup("Object", "action").unwrap();
    assert_eq!(action.shape, DeclShape::EntityPointer(IdKind::Action));
    assert!(action.poll().is_some());
    assert!(action.builtin);
}

#[test]
fn builtins_cannot_be_removed() {
    let mut registry = SchemaRegistry::new();
    assert!(matches!(
        registry.undeclare("Object", "parent"),
        Err(SchemaError::Builtin(_))
    ));
    assert!(matches!(
        registry.unregister_struct("Scene"),
        Err(SchemaError::Builtin(_))
    ));
}

// ── Declaration ──────────────────────────────────────────────────

#[test]
fn entity_type_accepts_pointer_to_entity_type() {
    let mut registry = SchemaRegistry::new();
    registry
        .register_struct("ObjectRef", StructClass::PropertyGroup)
        .unwrap();
    registry
        .declare("ObjectRef", "object", PropertyKind::pointer("Object"))
        .unwrap();
    registry
        .declare("Scene", "prop", PropertyKind::pointer("Object"))
        .unwrap();
    registry
        .declare("Scene", "prop_array", PropertyKind::collection("ObjectRef"))
        .unwrap();
    assert!(registry.has_property("Scene", "prop"));
    assert_eq!(
        registry.lookup("Scene", "prop_array").unwrap().shape,
        DeclShape::Collection("ObjectRef".into())
    );
    assert!(registry.can_hold_references("ObjectRef"));
}

#[test]
fn redeclaring_is_rejected() {
    let mut registry = SchemaRegistry::new();
    registry.declare("Scene", "level", PropertyKind::Int).unwrap();
    assert_eq!(
        registry.declare("Scene", "level", PropertyKind::Float),
        Err(SchemaError::AlreadyDeclared {
            owner: "Scene".into(),
            property: "level".into(),
        })
    );
}

#[test]
fn invalid_identifiers_are_rejected() {
    let mut registry = SchemaRegistry::new();
    for bad in ["", "1st", "with space", "dash-ed"] {
        assert!(matches!(
            registry.declare("Scene", bad, PropertyKind::Int),
            Err(SchemaError::InvalidIdentifier(_))
        ));
    }
}

#[test]
fn unknown_owner_and_target_are_rejected() {
    let mut registry = SchemaRegistry::new();
    assert!(matches!(
        registry.declare("Nope", "x", PropertyKind::Int),
        Err(SchemaError::UnknownStruct(_))
    ));
    assert!(matches!(
        registry.declare("Scene", "x", PropertyKind::pointer("Nope")),
        Err(SchemaError::UnknownStruct(_))
    ));
}

#[test]
fn pointer_to_embedded_struct_is_not_linkable() {
    let mut registry = SchemaRegistry::new();
    assert!(matches!(
        registry.declare("Scene", "node", PropertyKind::pointer("Node")),
        Err(SchemaError::TargetNotLinkable { .. })
    ));
}

#[test]
fn collection_of_entity_type_is_rejected() {
    let mut registry = SchemaRegistry::new();
    assert!(matches!(
        registry.declare("Scene", "objects_list", PropertyKind::collection("Object")),
        Err(SchemaError::InvalidCollectionElement { .. })
    ));
}

#[test]
fn operator_cannot_declare_entity_pointer() {
    let mut registry = SchemaRegistry::new();
    registry
        .register_struct("OBJECT_OT_pick", StructClass::Operator)
        .unwrap();
    assert_eq!(
        registry.declare("OBJECT_OT_pick", "prop", PropertyKind::pointer("Object")),
        Err(SchemaError::EntityRefsUnsupported {
            owner: "OBJECT_OT_pick".into(),
            property: "prop".into(),
        })
    );
    registry
        .declare("OBJECT_OT_pick", "count", PropertyKind::Int)
        .unwrap();
}

#[test]
fn ui_list_cannot_declare_entity_pointer() {
    let mut registry = SchemaRegistry::new();
    registry
        .register_struct("OBJECT_UL_rows", StructClass::UiList)
        .unwrap();
    assert!(matches!(
        registry.declare("OBJECT_UL_rows", "prop", PropertyKind::pointer("Object")),
        Err(SchemaError::EntityRefsUnsupported { .. })
    ));
}

#[test]
fn preferences_cannot_embed_group_holding_references() {
    let mut registry = registry_with_group("RefGroup");
    registry
        .declare("RefGroup", "target", PropertyKind::pointer("Object"))
        .unwrap();
    registry
        .register_struct("AddonPrefs", StructClass::AddonPreferences)
        .unwrap();
    assert!(matches!(
        registry.declare("AddonPrefs", "group", PropertyKind::pointer("RefGroup")),
        Err(SchemaError::EntityRefsUnsupported { .. })
    ));
}

#[test]
fn group_embedded_by_preferences_cannot_gain_references_later() {
    let mut registry = registry_with_group("Settings");
    registry
        .register_struct("AddonPrefs", StructClass::AddonPreferences)
        .unwrap();
    registry
        .declare("AddonPrefs", "settings", PropertyKind::pointer("Settings"))
        .unwrap();
    assert!(matches!(
        registry.declare("Settings", "target", PropertyKind::pointer("Object")),
        Err(SchemaError::EntityRefsUnsupported { .. })
    ));
    registry.declare("Settings", "size", PropertyKind::Float).unwrap();
}

#[test]
fn self_referencing_groups_terminate() {
    let mut registry = registry_with_group("Tree");
    registry
        .declare("Tree", "children", PropertyKind::collection("Tree"))
        .unwrap();
    assert!(!registry.can_hold_references("Tree"));
    registry
        .declare("Tree", "target", PropertyKind::pointer("Object"))
        .unwrap();
    assert!(registry.can_hold_references("Tree"));
}

#[test]
fn register_is_all_or_nothing() {
    let mut registry = SchemaRegistry::new();
    let builder = StructBuilder::new("OBJECT_OT_bad", StructClass::Operator)
        .property("count", PropertyKind::Int)
        .property("target", PropertyKind::pointer("Object"));
    assert!(registry.register(builder).is_err());
    assert!(registry.struct_def("OBJECT_OT_bad").is_none());

    let builder = StructBuilder::new("OBJECT_OT_good", StructClass::Operator)
        .property("count", PropertyKind::Int);
    registry.register(builder).unwrap();
    assert!(registry.has_property("OBJECT_OT_good", "count"));
}

#[test]
fn unregister_refuses_struct_in_use() {
    let mut registry = registry_with_group("Settings");
    registry
        .declare("Scene", "settings", PropertyKind::pointer("Settings"))
        .unwrap();
    assert!(matches!(
        registry.unregister_struct("Settings"),
        Err(SchemaError::StructInUse { .. })
    ));
    registry.undeclare("Scene", "settings").unwrap();
    registry.unregister_struct("Settings").unwrap();
}

// ── Assignment checks ────────────────────────────────────────────

#[test]
fn wrong_entity_kind_is_type_mismatch() {
    let mut registry = SchemaRegistry::new();
    registry
        .declare("Scene", "prop", PropertyKind::pointer("Object"))
        .unwrap();
    let scene = Entity::new(IdKind::Scene, "Scene");
    let lookup = Entities(vec![scene.clone()]);
    let err = registry
        .check_assignment(Some("Scene"), "prop", Value::Entity(scene.id), &lookup)
        .unwrap_err();
    assert!(matches!(err, AssignError::Type(_)));
}

#[test]
fn wrong_entity_kind_is_type_mismatch_even_with_poll() {
    let mut registry = SchemaRegistry::new();
    registry
        .declare(
            "Scene",
            "prop",
            PropertyKind::pointer_with_poll("Object", |_, _, _| true),
        )
        .unwrap();
    let scene = Entity::new(IdKind::Scene, "Scene");
    let lookup = Entities(vec![scene.clone()]);
    let err = registry
        .check_assignment(Some("Scene"), "prop", Value::Entity(scene.id), &lookup)
        .unwrap_err();
    assert!(matches!(err, AssignError::Type(_)));
}

#[test]
fn poll_is_not_consulted_on_assignment() {
    let mut registry = SchemaRegistry::new();
    registry
        .declare(
            "Scene",
            "prop",
            PropertyKind::pointer_with_poll("Object", |_, _, _| false),
        )
        .unwrap();
    let object = Entity::new(IdKind::Object, "Cube");
    let lookup = Entities(vec![object.clone()]);
    let stored = registry
        .check_assignment(Some("Scene"), "prop", Value::Entity(object.id), &lookup)
        .unwrap();
    assert_eq!(stored, Value::Entity(object.id));
}

#[test]
fn primitive_types_are_strict_except_int_to_float() {
    let mut registry = SchemaRegistry::new();
    registry.declare("Object", "weight", PropertyKind::Float).unwrap();
    registry.declare("Object", "label", PropertyKind::String).unwrap();
    let lookup = Entities(Vec::new());

    assert_eq!(
        registry
            .check_assignment(Some("Object"), "weight", Value::Int(2), &lookup)
            .unwrap(),
        Value::Float(2.0)
    );
    assert!(matches!(
        registry.check_assignment(Some("Object"), "label", Value::Int(2), &lookup),
        Err(AssignError::Type(_))
    ));
}

#[test]
fn undeclared_keys_are_dynamic() {
    let registry = SchemaRegistry::new();
    let lookup = Entities(Vec::new());
    let value = Value::Group(PropertyGroup::untyped(
        [("anything", Value::Bool(true))].into_iter().collect::<PropertyBag>(),
    ));
    assert_eq!(
        registry
            .check_assignment(Some("Object"), "custom", value.clone(), &lookup)
            .unwrap(),
        value
    );
    assert_eq!(
        registry
            .check_assignment(None, "custom", Value::Int(1), &lookup)
            .unwrap(),
        Value::Int(1)
    );
}

#[test]
fn assigning_to_group_pointer_is_permission_denied() {
    let mut registry = registry_with_group("Settings");
    registry
        .declare("Scene", "settings", PropertyKind::pointer("Settings"))
        .unwrap();
    let lookup = Entities(Vec::new());
    let err = registry
        .check_assignment(
            Some("Scene"),
            "settings",
            Value::Group(PropertyGroup::typed("Settings")),
            &lookup,
        )
        .unwrap_err();
    assert!(matches!(err, AssignError::PermissionDenied(_)));
}

#[test]
fn restricted_struct_rejects_reference_values() {
    let mut registry = SchemaRegistry::new();
    registry
        .register_struct("AddonPrefs", StructClass::AddonPreferences)
        .unwrap();
    let object = Entity::new(IdKind::Object, "Cube");
    let lookup = Entities(vec![object.clone()]);
    assert!(matches!(
        registry.check_assignment(Some("AddonPrefs"), "dyn", Value::Entity(object.id), &lookup),
        Err(AssignError::PermissionDenied(_))
    ));
}

#[test]
fn defaults_follow_declarations() {
    let mut registry = registry_with_group("Settings");
    registry.declare("Object", "count", PropertyKind::Int).unwrap();
    registry
        .declare("Object", "target", PropertyKind::pointer("Object"))
        .unwrap();
    registry
        .declare("Object", "rows", PropertyKind::collection("Settings"))
        .unwrap();

    assert_eq!(registry.default_value("Object", "count"), Some(Value::Int(0)));
    assert_eq!(registry.default_value("Object", "target"), None);
    assert_eq!(
        registry
            .default_value("Object", "rows")
            .and_then(|v| v.as_collection().map(|c| c.element_type.clone())),
        Some("Settings".to_string())
    );
    assert_eq!(registry.default_value("Object", "missing"), None);
}

#[test]
fn action_poll_matches_id_root() {
    let registry = SchemaRegistry::new();
    let poll = registry.lookup("Object", "action").unwrap().poll().unwrap().clone();
    let object = Entity::new(IdKind::Object, "Cube");
    let mut for_objects = Entity::new(IdKind::Action, "ObjAction");
    for_objects.data = EntityData::Action(ActionData {
        id_root: Some(IdKind::Object),
    });
    let mut for_materials = Entity::new(IdKind::Action, "MatAction");
    for_materials.data = EntityData::Action(ActionData {
        id_root: Some(IdKind::Material),
    });
    let floating = Entity::new(IdKind::Action, "Floating");
    let lookup = Entities(Vec::new());

    assert!(poll.poll(&lookup, &object, &for_objects));
    assert!(!poll.poll(&lookup, &object, &for_materials));
    assert!(poll.poll(&lookup, &object, &floating));
}
