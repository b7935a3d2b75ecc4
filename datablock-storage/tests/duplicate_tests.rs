use datablock_model::{PropertyCollection, PropertyKind, StructBuilder, StructClass, Value};
use datablock_storage::{PropertyPath, SceneCopy, Store, StoreError};
use datablock_types::{EntityId, IdKind};
use pretty_assertions::assert_eq;

fn users(store: &Store, id: EntityId) -> u32 {
    store.get(id).unwrap().users
}

fn pointee(store: &Store, path: &PropertyPath, key: &str) -> Option<EntityId> {
    store.get_entity(path, key).unwrap().map(|e| e.id)
}

/// Scene with a compositing tree whose render-layers node points at a
/// member object, plus an external material referenced by that object.
struct Fixture {
    store: Store,
    scene: EntityId,
    third: EntityId,
    external: EntityId,
}

fn fixture() -> Fixture {
    let mut store = Store::default();
    let scene = store.create(IdKind::Scene, "Scene");
    let first = store.create(IdKind::Object, "First Object");
    let third = store.create(IdKind::Object, "Third Object");
    let external = store.create(IdKind::Material, "External");
    store.link_object(scene, first).unwrap();
    store.link_object(scene, third).unwrap();
    store.set_use_nodes(scene, true).unwrap();

    let node = PropertyPath::entity(scene).node("Render Layers");
    store.set(&node, "prop", third).unwrap();
    store
        .set(&PropertyPath::entity(first), "sibling", third)
        .unwrap();
    store
        .set(&PropertyPath::entity(third), "material", external)
        .unwrap();
    Fixture {
        store,
        scene,
        third,
        external,
    }
}

// ── Plain copies ─────────────────────────────────────────────────

#[test]
fn copy_repoints_references_to_same_target() {
    let mut store = Store::default();
    let a = store.create(IdKind::Object, "A");
    let b = store.create(IdKind::Object, "B");
    store.set(&PropertyPath::entity(a), "prop", b).unwrap();
    assert_eq!(users(&store, b), 1);

    let copy = store.copy(a).unwrap();
    assert_ne!(copy, a);
    assert_eq!(store.get(copy).unwrap().name, "A.001");
    assert_eq!(pointee(&store, &PropertyPath::entity(copy), "prop"), Some(b));
    assert_eq!(users(&store, b), 2);
}

#[test]
fn copy_deep_copies_collections() {
    let mut store = Store::default();
    store
        .register(
            StructBuilder::new("ObjectRef", StructClass::PropertyGroup)
                .property("object", PropertyKind::pointer("Object")),
        )
        .unwrap();
    store
        .declare("Object", "refs", PropertyKind::collection("ObjectRef"))
        .unwrap();
    let holder = store.create(IdKind::Object, "Holder");
    let target = store.create(IdKind::Object, "Target");
    let path = PropertyPath::entity(holder);
    store.collection_add(&path, "refs").unwrap();
    store
        .set(&path.clone().item("refs", 0), "object", target)
        .unwrap();

    let copy = store.copy(holder).unwrap();
    let copy_path = PropertyPath::entity(copy);
    assert_eq!(
        pointee(&store, &copy_path.clone().item("refs", 0), "object"),
        Some(target)
    );
    assert_eq!(users(&store, target), 2);

    // Elements belong to their holder: growing the copy leaves the source alone.
    store.collection_add(&copy_path, "refs").unwrap();
    assert_eq!(store.collection_len(&copy_path, "refs").unwrap(), 2);
    assert_eq!(store.collection_len(&path, "refs").unwrap(), 1);
}

#[test]
fn copy_of_node_custom_data_repoints() {
    let Fixture {
        mut store,
        scene,
        third,
        ..
    } = fixture();
    let copy = store.copy(scene).unwrap();

    let node = PropertyPath::entity(copy).node("Render Layers");
    assert_eq!(pointee(&store, &node, "prop"), Some(third));
    assert_eq!(users(&store, third), 3);
    // Membership is shared, not copied.
    assert_eq!(
        store.get(copy).unwrap().owned_objects(),
        store.get(scene).unwrap().owned_objects()
    );
}

// ── Scene duplication ────────────────────────────────────────────

#[test]
fn full_copy_remaps_internal_references() {
    let Fixture {
        mut store,
        scene,
        third,
        external,
    } = fixture();
    let copy = store.duplicate_scene(scene, SceneCopy::FullCopy).unwrap();

    let copied_scene = store.get(copy).unwrap();
    assert_eq!(copied_scene.name, "Scene.001");
    let members = copied_scene.owned_objects().to_vec();
    assert_eq!(members.len(), 2);
    let third_copy = store.find(IdKind::Object, "Third Object.001", None).unwrap().id;
    let first_copy = store.find(IdKind::Object, "First Object.001", None).unwrap().id;
    assert!(members.contains(&third_copy));
    assert!(members.contains(&first_copy));

    let node = PropertyPath::entity(copy).node("Render Layers");
    assert_eq!(pointee(&store, &node, "prop"), Some(third_copy));
    assert_eq!(
        pointee(&store, &PropertyPath::entity(first_copy), "sibling"),
        Some(third_copy)
    );
    // External targets stay shared.
    assert_eq!(
        pointee(&store, &PropertyPath::entity(third_copy), "material"),
        Some(external)
    );
    assert_eq!(users(&store, external), 2);
    // The source is untouched.
    let source_node = PropertyPath::entity(scene).node("Render Layers");
    assert_eq!(pointee(&store, &source_node, "prop"), Some(third));
    assert!(store.audit_users().is_empty());
}

#[test]
fn sibling_full_copies_do_not_alias() {
    let Fixture {
        mut store, scene, third, ..
    } = fixture();
    let first = store.duplicate_scene(scene, SceneCopy::FullCopy).unwrap();
    let second = store.duplicate_scene(scene, SceneCopy::FullCopy).unwrap();

    let a = pointee(&store, &PropertyPath::entity(first).node("Render Layers"), "prop").unwrap();
    let b = pointee(&store, &PropertyPath::entity(second).node("Render Layers"), "prop").unwrap();
    assert_ne!(a, b);
    assert_ne!(a, third);
    assert_ne!(b, third);
    assert_eq!(store.get(a).unwrap().name, "Third Object.001");
    assert_eq!(store.get(b).unwrap().name, "Third Object.002");
    assert!(store.get(first).unwrap().owned_objects().contains(&a));
    assert!(store.get(second).unwrap().owned_objects().contains(&b));
}

#[test]
fn link_copy_shares_objects() {
    let Fixture {
        mut store, scene, ..
    } = fixture();
    let copy = store.duplicate_scene(scene, SceneCopy::LinkCopy).unwrap();
    assert_eq!(
        store.get(copy).unwrap().owned_objects(),
        store.get(scene).unwrap().owned_objects()
    );
    assert_eq!(store.entities_of(IdKind::Object).len(), 2);
}

#[test]
fn empty_copy_has_no_objects() {
    let Fixture {
        mut store,
        scene,
        third,
        ..
    } = fixture();
    store
        .set(&PropertyPath::entity(scene), "note", "keep me")
        .unwrap();
    let copy = store.duplicate_scene(scene, SceneCopy::Empty).unwrap();

    let copied = store.get(copy).unwrap();
    assert!(copied.owned_objects().is_empty());
    let tree = copied.node_tree().unwrap();
    assert!(tree.node("Render Layers").unwrap().properties.is_empty());
    assert_eq!(
        store
            .get_property(&PropertyPath::entity(copy), "note")
            .unwrap(),
        Some(Value::from("keep me"))
    );
    assert_eq!(users(&store, third), 2);
}

#[test]
fn duplicate_scene_rejects_other_kinds() {
    let Fixture {
        mut store, third, ..
    } = fixture();
    assert!(matches!(
        store.duplicate_scene(third, SceneCopy::FullCopy),
        Err(StoreError::WrongKind { .. })
    ));
}

#[test]
fn full_copy_carries_member_custom_data() {
    let mut store = Store::default();
    let scene = store.create(IdKind::Scene, "Scene");
    let object = store.create(IdKind::Object, "Cube");
    store.link_object(scene, object).unwrap();
    store
        .set(
            &PropertyPath::entity(object),
            "rows",
            Value::Collection(PropertyCollection::new("Row")),
        )
        .unwrap();

    let copy = store.duplicate_scene(scene, SceneCopy::FullCopy).unwrap();
    let cube_copy = store.get(copy).unwrap().owned_objects()[0];
    assert_ne!(cube_copy, object);
    assert!(
        store
            .get_property(&PropertyPath::entity(cube_copy), "rows")
            .unwrap()
            .is_some()
    );
}
