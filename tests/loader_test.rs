use std::path::Path;

use cgmath::{Matrix4, Vector3};
use flow_scenes::{
    audio::AudioFormat,
    data_structures::{
        scene_graph::{NodeKind, SceneGraph},
        skin::skin_geometry,
    },
    error::AssetError,
    resources::AssetLoader,
};

fn loader(runtime: &tokio::runtime::Runtime, root: &Path) -> AssetLoader {
    AssetLoader::new(runtime.handle().clone()).with_root(root.to_string_lossy())
}

const TRIANGLE: &str = "\
o Triangle
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 0.0 1.0
f 1/1 2/2 3/3
";

#[test]
fn obj_files_become_one_node_per_object() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(dir.path().join("models")).expect("mkdir");
    std::fs::write(dir.path().join("models/triangle.obj"), TRIANGLE).expect("write obj");

    let model = runtime
        .block_on(loader(&runtime, dir.path()).model("models/triangle.obj"))
        .expect("model");
    assert_eq!(model.nodes.len(), 1);
    assert_eq!(model.roots, vec![0]);
    assert_eq!(model.nodes[0].name, "Triangle");
    let geometry = &model.nodes[0].primitives[0].geometry;
    assert_eq!(geometry.vertex_count(), 3);
    assert_eq!(geometry.triangles().count(), 1);
}

#[test]
fn unknown_model_extensions_are_rejected_without_reading() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let dir = tempfile::tempdir().expect("tempdir");
    let result = runtime.block_on(loader(&runtime, dir.path()).model("scene.fbx"));
    assert!(matches!(result, Err(AssetError::Unsupported { .. })));
}

#[test]
fn audio_is_sniffed_not_trusted_by_name() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("real.mp3"), b"ID3\x04\x00\x00\x00\x00\x00\x00").expect("write");
    std::fs::write(dir.path().join("fake.mp3"), b"<html>not found</html>").expect("write");
    let loader = loader(&runtime, dir.path());

    let audio = runtime.block_on(loader.audio("real.mp3")).expect("audio");
    assert_eq!(audio.format, AudioFormat::Mp3);
    let fake = runtime.block_on(loader.audio("fake.mp3"));
    assert!(matches!(fake, Err(AssetError::Unsupported { .. })));
}

#[test]
fn broken_json_is_a_decode_error_naming_the_file() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("font.json"), "{ \"glyphs\": ").expect("write");

    let error = runtime
        .block_on(loader(&runtime, dir.path()).font("font.json"))
        .expect_err("truncated json");
    assert!(matches!(error, AssetError::Decode { .. }));
    assert!(error.to_string().contains("font.json"));
}

#[test]
fn loads_resolve_even_when_awaited_late() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("data.json"), "[1, 2, 3]").expect("write");

    let pending = loader(&runtime, dir.path()).json::<Vec<u32>>("data.json");
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(pending.source(), "data.json");
    assert_eq!(runtime.block_on(pending).expect("json"), vec![1, 2, 3]);
}

/// A three vertex strip skinned to a hip and a knee one unit above it.
const LEG_GLTF: &str = r#"{
  "asset": { "version": "2.0" },
  "scene": 0,
  "scenes": [{ "nodes": [0, 2] }],
  "nodes": [
    { "name": "Hip", "children": [1] },
    { "name": "Knee", "translation": [0, 1, 0] },
    { "name": "Leg", "mesh": 0, "skin": 0 }
  ],
  "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0, "JOINTS_0": 1, "WEIGHTS_0": 2 } }] }],
  "skins": [{ "name": "Rig", "joints": [0, 1], "inverseBindMatrices": 3 }],
  "buffers": [{ "uri": "leg.bin", "byteLength": 236 }],
  "bufferViews": [
    { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
    { "buffer": 0, "byteOffset": 36, "byteLength": 24 },
    { "buffer": 0, "byteOffset": 60, "byteLength": 48 },
    { "buffer": 0, "byteOffset": 108, "byteLength": 128 }
  ],
  "accessors": [
    { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [0.5, 2, 0] },
    { "bufferView": 1, "componentType": 5123, "count": 3, "type": "VEC4" },
    { "bufferView": 2, "componentType": 5126, "count": 3, "type": "VEC4" },
    { "bufferView": 3, "componentType": 5126, "count": 2, "type": "MAT4" }
  ]
}"#;

fn leg_bin() -> Vec<u8> {
    let mut bytes = Vec::new();
    let floats = |bytes: &mut Vec<u8>, values: &[f32]| {
        bytes.extend(values.iter().flat_map(|v| v.to_le_bytes()));
    };
    floats(&mut bytes, &[0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.5, 2.0, 0.0]);
    for joint in [0u16, 0, 0, 0, 0, 1, 0, 0, 1, 0, 0, 0] {
        bytes.extend(joint.to_le_bytes());
    }
    floats(&mut bytes, &[1.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    // column major: identity for the hip, one unit down for the knee
    floats(&mut bytes, &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    floats(&mut bytes, &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, -1.0, 0.0, 1.0]);
    assert_eq!(bytes.len(), 236);
    bytes
}

#[test]
fn gltf_skins_deform_with_their_joints() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("leg.gltf"), LEG_GLTF).expect("write gltf");
    std::fs::write(dir.path().join("leg.bin"), leg_bin()).expect("write bin");

    let model = runtime
        .block_on(loader(&runtime, dir.path()).model("leg.gltf"))
        .expect("model");
    assert_eq!(model.skins.len(), 1);
    assert_eq!(model.skins[0].name, "Rig");
    assert_eq!(model.skins[0].joints, vec![0, 1]);
    assert_eq!(
        model.skins[0].inverse_bind_matrices[1],
        Matrix4::from_translation(Vector3::new(0.0, -1.0, 0.0))
    );
    assert_eq!(model.nodes[2].skin, Some(0));
    let weights = model.nodes[2].primitives[0].geometry.skin.clone().expect("weights");
    assert_eq!(weights.joints[1], [0, 1, 0, 0]);
    assert_eq!(weights.weights[1], [0.5, 0.5, 0.0, 0.0]);

    let mut scene = SceneGraph::new();
    let instance = scene.instantiate(&model);
    let (knee, leg) = (instance.nodes[1], instance.nodes[2]);
    let pose = |scene: &SceneGraph| {
        let node = scene.get(leg).expect("leg");
        let NodeKind::Mesh(primitives) = &node.kind else {
            panic!("leg is not a mesh");
        };
        let skin = node.skin.as_ref().expect("bound skin");
        let matrices = skin.joint_matrices(scene, &scene.world_matrix(leg));
        skin_geometry(&primitives[0].geometry, &matrices).expect("skinned").0
    };
    let close = |a: [f32; 3], b: [f32; 3]| a.iter().zip(b).all(|(a, b)| (a - b).abs() < 1e-5);
    let rest = pose(&scene);
    assert!(close(rest[1], [0.0, 1.0, 0.0]) && close(rest[2], [0.5, 2.0, 0.0]), "{:?}", rest);

    // sliding the knee sideways drags the foot fully and the knee vertex halfway
    if let Some(node) = scene.get_mut(knee) {
        node.transform.position = Vector3::new(1.0, 1.0, 0.0);
    }
    let posed = pose(&scene);
    assert!(close(posed[0], [0.0, 0.0, 0.0]), "{:?}", posed);
    assert!(close(posed[1], [0.5, 1.0, 0.0]), "{:?}", posed);
    assert!(close(posed[2], [1.5, 2.0, 0.0]), "{:?}", posed);
}
