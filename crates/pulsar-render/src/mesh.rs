// SPDX-License-Identifier: CEPL-1.0
//! Flattening of decoded OBJ-style corner lists into deduplicated
//! vertex/index arrays for the model pass.
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use bytemuck::{Pod, Zeroable};
use pulsar_core::{Error, Result};

/// Vertex of the model pass; the layout is the vertex input of the model
/// pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

/// Structural identity of a [`MeshVertex`]: every field compared bit for bit
/// (so `-0.0 != 0.0` and NaNs with equal payloads match).
///
/// Hashing feeds position, then colour, then texcoord, component by component.
#[derive(Clone, Copy, Debug)]
pub struct VertexKey(MeshVertex);

impl VertexKey {
    fn bits(&self) -> [u32; 8] {
        let v = &self.0;
        [
            v.position[0].to_bits(),
            v.position[1].to_bits(),
            v.position[2].to_bits(),
            v.color[0].to_bits(),
            v.color[1].to_bits(),
            v.color[2].to_bits(),
            v.tex_coord[0].to_bits(),
            v.tex_coord[1].to_bits(),
        ]
    }
}

impl PartialEq for VertexKey {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for VertexKey {}

impl Hash for VertexKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.bits() {
            b.hash(state);
        }
    }
}

/// One face corner as produced by an OBJ decoder.
#[derive(Clone, Copy, Debug)]
pub struct Corner {
    pub position: u32,
    pub tex_coord: Option<u32>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Default)]
pub struct MeshBuilder {
    unique: HashMap<VertexKey, u32>,
    mesh: MeshData,
}

impl MeshVertex {
    pub const POSITION_OFFSET: u32 = std::mem::offset_of!(MeshVertex, position) as u32;
    pub const COLOR_OFFSET: u32 = std::mem::offset_of!(MeshVertex, color) as u32;
    pub const TEX_COORD_OFFSET: u32 = std::mem::offset_of!(MeshVertex, tex_coord) as u32;
    pub const STRIDE: u32 = std::mem::size_of::<MeshVertex>() as u32;
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one index; new vertices get the next index in first-seen order.
    pub fn push(&mut self, vertex: MeshVertex) -> u32 {
        let next = self.mesh.vertices.len() as u32;
        let index = *self.unique.entry(VertexKey(vertex)).or_insert(next);
        if index == next {
            self.mesh.vertices.push(vertex);
        }
        self.mesh.indices.push(index);
        index
    }

    pub fn finish(self) -> MeshData {
        self.mesh
    }

    /// Appends every corner of one decoded shape. Corner indices refer to
    /// this shape's own `positions`/`tex_coords`.
    pub fn push_corners(&mut self, positions: &[f32], tex_coords: &[f32], corners: &[Corner]) -> Result<()> {
        for (n, c) in corners.iter().enumerate() {
            let p = c.position as usize * 3;
            let position = positions
                .get(p..p + 3)
                .ok_or_else(|| invalid(n, "position index out of range"))?;
            let tex_coord = match c.tex_coord {
                Some(t) => {
                    let t = t as usize * 2;
                    let uv = tex_coords
                        .get(t..t + 2)
                        .ok_or_else(|| invalid(n, "texcoord index out of range"))?;
                    [uv[0], uv[1]]
                }
                None => [0.0, 0.0],
            };
            self.push(MeshVertex {
                position: [position[0], position[1], position[2]],
                color: [1.0, 1.0, 1.0],
                tex_coord,
            });
        }
        Ok(())
    }
}

/// Builds a white-vertex mesh from flat `xyz` positions, `uv` texcoords and
/// the decoder's corner list.
pub fn mesh_from_corners(positions: &[f32], tex_coords: &[f32], corners: &[Corner]) -> Result<MeshData> {
    let mut builder = MeshBuilder::new();
    builder.push_corners(positions, tex_coords, corners)?;
    Ok(builder.finish())
}

fn invalid(corner: usize, detail: &str) -> Error {
    Error::InvalidAsset {
        name: format!("mesh corner {corner}"),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> (Vec<f32>, Vec<f32>, Vec<Corner>) {
        let positions = vec![
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            1.0, 1.0, 0.0, //
            0.0, 1.0, 0.0,
        ];
        let uvs = vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let corners = [0u32, 1, 2, 2, 3, 0]
            .into_iter()
            .map(|i| Corner {
                position: i,
                tex_coord: Some(i),
            })
            .collect();
        (positions, uvs, corners)
    }

    #[test]
    fn shared_corners_collapse() {
        let (p, t, c) = quad();
        let mesh = mesh_from_corners(&p, &t, &c).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 3, 0]);
    }

    #[test]
    fn index_assignment_is_first_seen_order() {
        let (p, t, mut c) = quad();
        c.reverse();
        let mesh = mesh_from_corners(&p, &t, &c).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 3, 0]);
        assert_eq!(mesh.vertices[0].position, [0.0, 0.0, 0.0]);
        assert_eq!(mesh.vertices[1].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn texcoord_splits_vertex() {
        let mut b = MeshBuilder::new();
        let v = MeshVertex {
            position: [1.0, 2.0, 3.0],
            color: [1.0; 3],
            tex_coord: [0.0, 0.0],
        };
        assert_eq!(b.push(v), 0);
        assert_eq!(b.push(MeshVertex { tex_coord: [0.5, 0.0], ..v }), 1);
        assert_eq!(b.push(v), 0);
        assert_eq!(b.finish().vertices.len(), 2);
    }

    #[test]
    fn shapes_share_one_index_space() {
        let (p, t, c) = quad();
        let mut b = MeshBuilder::new();
        b.push_corners(&p, &t, &c).unwrap();
        b.push_corners(&p, &t, &c[..3]).unwrap();
        let mesh = b.finish();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 3, 0, 0, 1, 2]);
        assert_eq!(MeshVertex::STRIDE, 32);
        assert_eq!(MeshVertex::TEX_COORD_OFFSET, 24);
    }

    #[test]
    fn out_of_range_corner_is_an_error() {
        let (p, t, _) = quad();
        let err = mesh_from_corners(
            &p,
            &t,
            &[Corner {
                position: 9,
                tex_coord: None,
            }],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidAsset { .. }));
    }
}
