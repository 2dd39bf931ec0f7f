//! Skeletal skinning.
//!
//! A skinned mesh carries [`SkinWeights`]: up to four joints per vertex with
//! their weights. The mesh node's [`Skin`] names the joint nodes and the
//! inverse bind matrices taking mesh space to each joint's rest space. Every
//! frame the joint matrices are rebuilt from the joints' world transforms and
//! the vertices are blended on the CPU.

use cgmath::{InnerSpace, Matrix4, SquareMatrix, Transform, Vector3, Zero};

use crate::data_structures::{
    geometry::Geometry,
    scene_graph::{NodeId, SceneGraph},
};

/// Joint influences, four per vertex.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkinWeights {
    /// Indices into the skin's joint list.
    pub joints: Vec<[u16; 4]>,
    pub weights: Vec<[f32; 4]>,
}

/// A skin as decoded from a model file, its joints are model node indices.
#[derive(Clone, Debug, Default)]
pub struct ModelSkin {
    pub name: String,
    pub joints: Vec<usize>,
    pub inverse_bind_matrices: Vec<Matrix4<f32>>,
}

/// A skin bound to scene nodes.
#[derive(Clone, Debug, Default)]
pub struct Skin {
    pub joints: Vec<NodeId>,
    pub inverse_bind_matrices: Vec<Matrix4<f32>>,
}

impl Skin {
    pub fn new(joints: Vec<NodeId>, inverse_bind_matrices: Vec<Matrix4<f32>>) -> Self {
        Self {
            joints,
            inverse_bind_matrices,
        }
    }

    /// One matrix per joint taking bind pose mesh space to the current pose,
    /// relative to the mesh node at `mesh_world`.
    pub fn joint_matrices(&self, scene: &SceneGraph, mesh_world: &Matrix4<f32>) -> Vec<Matrix4<f32>> {
        let to_mesh = mesh_world.invert().unwrap_or_else(Matrix4::identity);
        self.joints
            .iter()
            .enumerate()
            .map(|(i, joint)| {
                let inverse_bind = self
                    .inverse_bind_matrices
                    .get(i)
                    .copied()
                    .unwrap_or_else(Matrix4::identity);
                to_mesh * scene.world_matrix(*joint) * inverse_bind
            })
            .collect()
    }
}

/// Blended positions and normals of a skinned geometry, `None` if it has no weights.
///
/// Influences naming a joint past the end of `joint_matrices` are ignored;
/// vertices left without any weight keep their bind pose.
pub fn skin_geometry(
    geometry: &Geometry,
    joint_matrices: &[Matrix4<f32>],
) -> Option<(Vec<[f32; 3]>, Vec<[f32; 3]>)> {
    let weights = geometry.skin.as_ref()?;
    let mut positions = Vec::with_capacity(geometry.positions.len());
    let mut normals = Vec::with_capacity(geometry.positions.len());
    for (i, position) in geometry.positions.iter().enumerate() {
        let joints = weights.joints.get(i).copied().unwrap_or_default();
        let amounts = weights.weights.get(i).copied().unwrap_or_default();
        let mut blend = Matrix4::zero();
        let mut total = 0.0;
        for (joint, amount) in joints.iter().zip(amounts) {
            if amount <= 0.0 {
                continue;
            }
            if let Some(matrix) = joint_matrices.get(*joint as usize) {
                blend += *matrix * amount;
                total += amount;
            }
        }
        let blend = if total > f32::EPSILON {
            blend / total
        } else {
            Matrix4::identity()
        };
        let p = blend.transform_point((*position).into());
        positions.push([p.x, p.y, p.z]);
        let normal = geometry.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]);
        let n = blend.transform_vector(Vector3::from(normal));
        let n = if n.magnitude2() > f32::EPSILON {
            n.normalize()
        } else {
            Vector3::from(normal)
        };
        normals.push(n.into());
    }
    Some((positions, normals))
}
