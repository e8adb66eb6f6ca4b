// SPDX-License-Identifier: CEPL-1.0
//! CPU side of the model pass: decoded mesh and texture, and the per-frame
//! transform block.
//!
//! Decoding is delegated to `tobj` and `image`; everything past this module
//! only sees flat vertex/index arrays and tightly packed RGBA8 pixels.
use std::io::Cursor;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use pulsar_core::{Error, Result};
use tracing::info;

use crate::assets::load_bytes;
use crate::mesh::{Corner, MeshBuilder, MeshData};

/// RGBA8 pixels, row-major, no padding.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidAsset {
                name: "texture".into(),
                detail: format!("zero-sized image {width}x{height}"),
            });
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(Error::InvalidAsset {
                name: "texture".into(),
                detail: format!("{} bytes for {width}x{height} rgba8, expected {expected}", pixels.len()),
            });
        }
        Ok(Self { width, height, pixels })
    }

    /// Full chain down to 1x1: `floor(log2(max(w, h))) + 1`.
    pub fn mip_levels(&self) -> u32 {
        u32::BITS - self.width.max(self.height).leading_zeros()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelData {
    pub mesh: MeshData,
    pub texture: TextureData,
}

pub fn load_model(obj: &Path, texture: &Path) -> Result<ModelData> {
    let mesh = load_obj(obj)?;
    let texture = load_texture(texture)?;
    info!(
        "model: {} vertices, {} indices, {}x{} texture ({} mips)",
        mesh.vertices.len(),
        mesh.indices.len(),
        texture.width,
        texture.height,
        texture.mip_levels()
    );
    Ok(ModelData { mesh, texture })
}

/// Triangulated, deduplicated mesh of every shape in the file. Materials are
/// ignored. Texcoords are flipped to a top-left origin.
pub fn load_obj(path: &Path) -> Result<MeshData> {
    let bytes = load_bytes(path)?;
    let invalid = |detail: String| Error::InvalidAsset {
        name: path.display().to_string(),
        detail,
    };
    let opts = tobj::LoadOptions {
        triangulate: true,
        ..Default::default()
    };
    let (models, _) = tobj::load_obj_buf(&mut Cursor::new(bytes), &opts, |_| Ok(Default::default()))
        .map_err(|e| invalid(e.to_string()))?;

    let mut builder = MeshBuilder::new();
    for model in &models {
        let m = &model.mesh;
        let flipped: Vec<f32> = m
            .texcoords
            .chunks_exact(2)
            .flat_map(|uv| [uv[0], 1.0 - uv[1]])
            .collect();
        let corners: Vec<Corner> = m
            .indices
            .iter()
            .enumerate()
            .map(|(i, &position)| Corner {
                position,
                tex_coord: m.texcoord_indices.get(i).copied(),
            })
            .collect();
        builder
            .push_corners(&m.positions, &flipped, &corners)
            .map_err(|e| invalid(format!("shape '{}': {e}", model.name)))?;
    }
    let mesh = builder.finish();
    if mesh.indices.is_empty() {
        return Err(invalid("no faces".into()));
    }
    Ok(mesh)
}

pub fn load_texture(path: &Path) -> Result<TextureData> {
    let bytes = load_bytes(path)?;
    let rgba = image::load_from_memory(&bytes)
        .map_err(|e| Error::InvalidAsset {
            name: path.display().to_string(),
            detail: e.to_string(),
        })?
        .into_rgba8();
    let (width, height) = rgba.dimensions();
    TextureData::new(width, height, rgba.into_raw())
}

/// Vertex-stage transforms of the model pass, one block per frame slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ModelUniform {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl ModelUniform {
    /// Model spun around +Z, seen from (2, 2, 2) with a 45° lens. Depth maps
    /// to 0..1 and clip-space Y points down.
    pub fn orbit(seconds: f32, spin_deg_per_sec: f32, aspect: f32) -> Self {
        let model = Mat4::from_rotation_z((seconds * spin_deg_per_sec).to_radians());
        let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z);
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
        proj.y_axis.y *= -1.0;
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
        }
    }

    pub fn clip_position(&self, p: Vec3) -> glam::Vec4 {
        let mvp = Mat4::from_cols_array_2d(&self.proj)
            * Mat4::from_cols_array_2d(&self.view)
            * Mat4::from_cols_array_2d(&self.model);
        mvp * p.extend(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pulsar-model-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    const QUAD_OBJ: &str = "\
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

    #[test]
    fn obj_is_triangulated_and_deduplicated() {
        let dir = scratch("obj");
        let path = dir.join("quad.obj");
        std::fs::write(&path, QUAD_OBJ).unwrap();
        let mesh = load_obj(&path).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
        // v = 0 at the bottom of the OBJ is the bottom row of the image
        assert_eq!(mesh.vertices[0].tex_coord, [0.0, 1.0]);
        assert_eq!(mesh.vertices[2].tex_coord, [1.0, 0.0]);
    }

    #[test]
    fn obj_without_faces_is_invalid() {
        let dir = scratch("empty");
        let path = dir.join("points.obj");
        std::fs::write(&path, "v 0 0 0\n").unwrap();
        assert!(matches!(load_obj(&path), Err(Error::InvalidAsset { .. })));
        assert!(matches!(
            load_obj(&dir.join("missing.obj")),
            Err(Error::FileNotFound { .. })
        ));
    }

    #[test]
    fn png_decodes_to_rgba8() {
        let dir = scratch("png");
        let path = dir.join("tex.png");
        image::RgbImage::from_pixel(6, 3, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();
        let tex = load_texture(&path).unwrap();
        assert_eq!((tex.width, tex.height), (6, 3));
        assert_eq!(&tex.pixels[..4], &[10, 20, 30, 255]);
        assert_eq!(tex.mip_levels(), 3);

        std::fs::write(dir.join("junk.png"), b"not a png").unwrap();
        assert!(matches!(
            load_texture(&dir.join("junk.png")),
            Err(Error::InvalidAsset { .. })
        ));
    }

    #[test]
    fn mip_chain_length() {
        let tex = |w, h| TextureData::new(w, h, vec![0; (w * h * 4) as usize]).unwrap();
        assert_eq!(tex(1, 1).mip_levels(), 1);
        assert_eq!(tex(1024, 1024).mip_levels(), 11);
        assert_eq!(tex(1000, 3).mip_levels(), 10);
        assert!(TextureData::new(2, 2, vec![0; 15]).is_err());
        assert!(TextureData::new(0, 2, Vec::new()).is_err());
    }

    #[test]
    fn orbit_camera() {
        let u = ModelUniform::orbit(0.0, 90.0, 4.0 / 3.0);
        assert_eq!(u.model, Mat4::IDENTITY.to_cols_array_2d());
        assert!(u.proj[1][1] < 0.0, "y must be flipped for vulkan clip space");

        let c = u.clip_position(Vec3::ZERO);
        assert!((c.x / c.w).abs() < 1e-5 && (c.y / c.w).abs() < 1e-5);
        let z = c.z / c.w;
        assert!((0.0..=1.0).contains(&z), "depth {z}");

        let quarter = ModelUniform::orbit(1.0, 90.0, 1.0);
        let m = Mat4::from_cols_array_2d(&quarter.model);
        assert!(m.transform_point3(Vec3::X).abs_diff_eq(Vec3::Y, 1e-5));
    }
}
