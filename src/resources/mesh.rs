//! Model files (Wavefront OBJ and glTF) decoded into [`ModelScene`]s.

use std::{
    collections::HashMap,
    io::{BufReader, Cursor},
    sync::Arc,
};

use cgmath::{Matrix4, Quaternion, SquareMatrix, Vector3};

use crate::{
    data_structures::{
        geometry::Geometry,
        instance::Instance,
        material::{Material, Shading, Side},
        scene_graph::{ModelNode, ModelScene, Primitive},
        skin::{ModelSkin, SkinWeights},
        texture::TextureData,
    },
    error::AssetError,
    resources::{
        AssetLoader, Pending,
        animation::{AnimationClip, Channel, Keyframes},
        extension, sibling,
    },
};

impl AssetLoader {
    /// A model file, picked by extension: `.obj`, `.gltf` or `.glb`.
    pub fn model(&self, source: &str) -> Pending<ModelScene> {
        match extension(source).as_deref() {
            Some("obj") => self.obj_model(source),
            Some("gltf" | "glb") => self.gltf_model(source),
            _ => Pending::ready(
                source,
                Err(AssetError::unsupported(source, "expected an .obj, .gltf or .glb file")),
            ),
        }
    }

    fn text(&self, source: &str) -> Pending<String> {
        self.load(source, |name, bytes| {
            String::from_utf8(bytes).map_err(|e| AssetError::decode(name, e))
        })
    }

    fn obj_model(&self, source: &str) -> Pending<ModelScene> {
        let loader = self.clone();
        let name = source.to_string();
        Pending::from_future(source, async move {
            let obj_text = loader.text(&name).await?;
            let mut obj_reader = BufReader::new(Cursor::new(obj_text));

            let (models, obj_materials) = tobj::load_obj_buf_async(
                &mut obj_reader,
                &tobj::LoadOptions {
                    triangulate: true,
                    single_index: true,
                    ..Default::default()
                },
                |p| {
                    let mtl = loader.text(&sibling(&name, &p));
                    async move {
                        match mtl.await {
                            Ok(text) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(text))),
                            Err(e) => {
                                log::warn!("{}", e);
                                Err(tobj::LoadError::OpenFileFailed)
                            }
                        }
                    }
                },
            )
            .await
            .map_err(|e| AssetError::decode(&name, e))?;

            let obj_materials = obj_materials.unwrap_or_else(|e| {
                log::warn!("{} is drawn without its materials: {}", name, e);
                Vec::new()
            });
            let mut maps = HashMap::new();
            for texture in obj_materials.iter().filter_map(|m| m.diffuse_texture.as_ref()) {
                if maps.contains_key(texture) {
                    continue;
                }
                match loader.texture(&sibling(&name, texture)).await {
                    Ok(map) => {
                        maps.insert(texture.clone(), map);
                    }
                    Err(e) => log::warn!("{}", e),
                }
            }

            let scene_name = name.clone();
            loader
                .decode(&name, move || Ok(obj_scene(&scene_name, models, &obj_materials, &maps)))
                .await
        })
    }

    fn gltf_model(&self, source: &str) -> Pending<ModelScene> {
        let loader = self.clone();
        let name = source.to_string();
        Pending::from_future(source, async move {
            let bytes = loader.read(&name).await?;
            let gltf = gltf::Gltf::from_slice(&bytes).map_err(|e| AssetError::decode(&name, e))?;

            // Load buffers
            let mut buffers = Vec::new();
            for buffer in gltf.buffers() {
                let data = match buffer.source() {
                    gltf::buffer::Source::Bin => gltf
                        .blob
                        .clone()
                        .ok_or_else(|| AssetError::decode(&name, "the binary chunk is missing"))?,
                    gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                        return Err(AssetError::unsupported(&name, "embedded data URIs"));
                    }
                    gltf::buffer::Source::Uri(uri) => loader.read(&sibling(&name, uri)).await?,
                };
                buffers.push(data);
            }

            // Fetch the encoded images, decoding happens with the rest
            let mut images = Vec::new();
            for image in gltf.images() {
                let encoded = match image.source() {
                    gltf::image::Source::View { view, mime_type } => {
                        let start = view.offset();
                        let end = start + view.length();
                        let data = buffers
                            .get(view.buffer().index())
                            .and_then(|b| b.get(start..end))
                            .map(<[u8]>::to_vec);
                        data.map(|data| (data, mime_extension(Some(mime_type))))
                    }
                    gltf::image::Source::Uri { uri, mime_type } => {
                        let path = sibling(&name, uri);
                        match loader.read(&path).await {
                            Ok(data) => Some((data, mime_extension(mime_type).or_else(|| extension(&path)))),
                            Err(e) => {
                                log::warn!("{}", e);
                                None
                            }
                        }
                    }
                };
                images.push(encoded);
            }

            let document = gltf.document;
            let scene_name = name.clone();
            loader
                .decode(&name, move || Ok(gltf_scene(&scene_name, &document, &buffers, images)))
                .await
        })
    }
}

fn mime_extension(mime_type: Option<&str>) -> Option<String> {
    mime_type
        .and_then(|m| m.rsplit('/').next())
        .map(str::to_string)
}

fn obj_scene(
    file_name: &str,
    models: Vec<tobj::Model>,
    materials: &[tobj::Material],
    maps: &HashMap<String, Arc<TextureData>>,
) -> ModelScene {
    let nodes: Vec<ModelNode> = models
        .into_iter()
        .map(|m| {
            let mesh = m.mesh;
            let positions = mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect();
            let normals = (!mesh.normals.is_empty())
                .then(|| mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]).collect());
            let uvs = (!mesh.texcoords.is_empty())
                .then(|| mesh.texcoords.chunks_exact(2).map(|t| [t[0], 1.0 - t[1]]).collect());
            let colors = (!mesh.vertex_color.is_empty())
                .then(|| mesh.vertex_color.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect());
            let geometry = Geometry::from_buffers(positions, normals, colors, uvs, Some(mesh.indices));
            let material = mesh
                .material_id
                .and_then(|id| materials.get(id))
                .map(|m| obj_material(m, maps))
                .unwrap_or_else(|| Material::phong(0xffffff));
            ModelNode {
                name: m.name,
                primitives: vec![Primitive::new(geometry, material)],
                ..Default::default()
            }
        })
        .collect();
    ModelScene {
        name: file_name.to_string(),
        roots: (0..nodes.len()).collect(),
        nodes,
        ..Default::default()
    }
}

fn obj_material(m: &tobj::Material, maps: &HashMap<String, Arc<TextureData>>) -> Material {
    let opacity = m.dissolve.unwrap_or(1.0);
    Material {
        shading: Shading::Phong {
            specular: m.specular.unwrap_or([0.067; 3]),
            shininess: m.shininess.unwrap_or(30.0),
        },
        color: m.diffuse.unwrap_or([1.0; 3]),
        opacity,
        transparent: opacity < 1.0,
        map: m.diffuse_texture.as_ref().and_then(|t| maps.get(t).cloned()),
        ..Default::default()
    }
}

fn gltf_scene(
    file_name: &str,
    document: &gltf::Document,
    buffers: &[Vec<u8>],
    images: Vec<Option<(Vec<u8>, Option<String>)>>,
) -> ModelScene {
    let textures: Vec<Option<Arc<TextureData>>> = images
        .into_iter()
        .enumerate()
        .map(|(index, encoded)| {
            let (data, ext) = encoded?;
            let label = format!("{}#image{}", file_name, index);
            TextureData::from_bytes(&label, &data, ext.as_deref())
                .map(Arc::new)
                .map_err(|e| log::warn!("{}", e))
                .ok()
        })
        .collect();

    let nodes = document
        .nodes()
        .map(|node| {
            let (translation, rotation, scale) = node.transform().decomposed();
            let primitives = node
                .mesh()
                .map(|mesh| {
                    mesh.primitives()
                        .filter_map(|primitive| gltf_primitive(file_name, &primitive, buffers, &textures))
                        .collect()
                })
                .unwrap_or_default();
            ModelNode {
                name: node
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("node{}", node.index())),
                transform: Instance::from_trs(translation, rotation, scale),
                primitives,
                children: node.children().map(|child| child.index()).collect(),
                skin: node.skin().map(|skin| skin.index()),
            }
        })
        .collect::<Vec<_>>();

    let roots = match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => scene.nodes().map(|n| n.index()).collect(),
        None => {
            let children: Vec<usize> = nodes.iter().flat_map(|n: &ModelNode| n.children.clone()).collect();
            (0..nodes.len()).filter(|i| !children.contains(i)).collect()
        }
    };

    ModelScene {
        name: file_name.to_string(),
        nodes,
        roots,
        clips: document
            .animations()
            .map(|animation| gltf_clip(&animation, buffers))
            .collect(),
        skins: document.skins().map(|skin| gltf_skin(&skin, buffers)).collect(),
    }
}

fn gltf_skin(skin: &gltf::Skin, buffers: &[Vec<u8>]) -> ModelSkin {
    let reader = skin.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
    let joints: Vec<usize> = skin.joints().map(|joint| joint.index()).collect();
    // absent inverse bind matrices mean the joints were bound at the identity
    let inverse_bind_matrices = reader
        .read_inverse_bind_matrices()
        .map(|matrices| matrices.map(Matrix4::from).collect())
        .unwrap_or_else(|| vec![Matrix4::identity(); joints.len()]);
    ModelSkin {
        name: skin
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("skin{}", skin.index())),
        joints,
        inverse_bind_matrices,
    }
}

fn gltf_primitive(
    file_name: &str,
    primitive: &gltf::Primitive,
    buffers: &[Vec<u8>],
    textures: &[Option<Arc<TextureData>>],
) -> Option<Primitive> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        log::warn!("{}: skipping a primitive drawn as {:?}", file_name, primitive.mode());
        return None;
    }
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
    let Some(positions) = reader.read_positions() else {
        log::warn!("{}: skipping a primitive without positions", file_name);
        return None;
    };
    let mut geometry = Geometry::from_buffers(
        positions.collect(),
        reader.read_normals().map(|n| n.collect()),
        reader.read_colors(0).map(|c| c.into_rgb_f32().collect()),
        reader.read_tex_coords(0).map(|t| t.into_f32().collect()),
        reader.read_indices().map(|i| i.into_u32().collect()),
    );
    if let (Some(joints), Some(weights)) = (reader.read_joints(0), reader.read_weights(0)) {
        geometry = geometry.with_skin(SkinWeights {
            joints: joints.into_u16().collect(),
            weights: weights.into_f32().collect(),
        });
    }

    let material = primitive.material();
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    let map = pbr
        .base_color_texture()
        .and_then(|info| textures.get(info.texture().source().index()).cloned().flatten());
    let material = Material {
        shading: Shading::Standard {
            roughness: pbr.roughness_factor(),
            metalness: pbr.metallic_factor(),
        },
        color: [r, g, b],
        emissive: material.emissive_factor(),
        opacity: a,
        transparent: material.alpha_mode() == gltf::material::AlphaMode::Blend,
        side: if material.double_sided() { Side::Double } else { Side::Front },
        vertex_colors: geometry.colors.is_some(),
        map,
        ..Default::default()
    };
    Some(Primitive::new(geometry, material))
}

fn gltf_clip(animation: &gltf::Animation, buffers: &[Vec<u8>]) -> AnimationClip {
    let channels = animation
        .channels()
        .filter_map(|channel| {
            let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
            let timestamps: Vec<f32> = reader.read_inputs()?.collect();
            let cubic = channel.sampler().interpolation() == gltf::animation::Interpolation::CubicSpline;
            let keyframes = match reader.read_outputs()? {
                gltf::animation::util::ReadOutputs::Translations(t) => {
                    Keyframes::Translation(key_values(t.map(Vector3::from).collect(), cubic))
                }
                gltf::animation::util::ReadOutputs::Rotations(r) => Keyframes::Rotation(key_values(
                    r.into_f32()
                        .map(|q| Quaternion::new(q[3], q[0], q[1], q[2]))
                        .collect(),
                    cubic,
                )),
                gltf::animation::util::ReadOutputs::Scales(s) => {
                    Keyframes::Scale(key_values(s.map(Vector3::from).collect(), cubic))
                }
                gltf::animation::util::ReadOutputs::MorphTargetWeights(_) => {
                    log::debug!("morph target channels are not played");
                    return None;
                }
            };
            Some(Channel {
                node: channel.target().node().index(),
                timestamps,
                keyframes,
            })
        })
        .collect();
    AnimationClip {
        name: animation
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Animation{}", animation.index())),
        channels,
    }
}

/// Cubic splines store an in-tangent, the value and an out-tangent per key.
fn key_values<T: Copy>(all: Vec<T>, cubic: bool) -> Vec<T> {
    if cubic {
        all.chunks(3).filter_map(|c| c.get(1).copied()).collect()
    } else {
        all
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    const CUBE_OBJ: &str = "\
mtllib cube.mtl
o Cube
v -1 -1 0
v 1 -1 0
v 1 1 0
v -1 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
usemtl Red
f 1/1 2/2 3/3 4/4
";

    const CUBE_MTL: &str = "\
newmtl Red
Kd 1 0 0
d 0.5
";

    #[test]
    fn obj_models_load_with_their_materials() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("cube.obj"), CUBE_OBJ).expect("obj");
        std::fs::write(dir.path().join("cube.mtl"), CUBE_MTL).expect("mtl");
        let loader = AssetLoader::new(runtime.handle().clone())
            .with_root(dir.path().to_string_lossy());

        let model = runtime.block_on(loader.model("cube.obj")).expect("model");
        assert_eq!(model.roots, vec![0]);
        assert_eq!(model.nodes[0].name, "Cube");
        let primitive = &model.nodes[0].primitives[0];
        assert_eq!(primitive.geometry.indices.len(), 6);
        assert_eq!(primitive.material.color, [1.0, 0.0, 0.0]);
        assert!(primitive.material.is_transparent());
    }

    #[test]
    fn unknown_model_formats_are_rejected() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let loader = AssetLoader::new(runtime.handle().clone());
        let result = runtime.block_on(loader.model("robot.fbx"));
        assert!(matches!(result, Err(AssetError::Unsupported { .. })));
    }

    #[test]
    fn broken_gltf_is_a_decode_error() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("broken.glb"), b"not a model").expect("glb");
        let loader = AssetLoader::new(runtime.handle().clone())
            .with_root(dir.path().to_string_lossy());
        let result = runtime.block_on(loader.model("broken.glb"));
        assert!(matches!(result, Err(AssetError::Decode { .. })));
    }
}
