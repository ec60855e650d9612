//! An immutable stack of layers plus top/bottom bounding half-spaces.

use crate::error::{Error, Result};
use crate::float::Float;
use crate::material::Material;
use serde::{Deserialize, Serialize};

/// A layered sample: `nLayers` real layers, sandwiched between an "above"
/// half-space (index 0) and a "below" half-space (index `nLayers + 1`).
///
/// The top of the first layer added sits at `z = 0`; subsequent layers
/// extend downward (increasing `z`). Prelayers may be inserted above layer
/// 0 afterwards, shifting every existing boundary down.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sample {
    materials: Vec<Material>, // index 0 = above, last = below
    /// `z_boundaries[i]` is the upper boundary of layer `i`, for
    /// `i in 0..=n_layers`. Has `n_layers + 1` entries; layer 0's own
    /// upper edge is conceptually `-inf` and is not stored.
    z_boundaries: Vec<Float>,
}

impl Sample {
    /// Starts building a sample with the given bounding half-space
    /// materials (`above`, `below`).
    #[must_use]
    pub fn builder(above: Material, below: Material) -> SampleBuilder {
        SampleBuilder {
            above,
            below,
            layers: Vec::new(),
        }
    }

    /// Number of real (non-half-space) layers.
    #[must_use]
    pub fn n_layers(&self) -> usize {
        self.materials.len() - 2
    }

    /// The material at layer index `i`, where `i = 0` is the upper
    /// half-space and `i = n_layers + 1` is the lower half-space.
    ///
    /// # Panics
    ///
    /// Panics if `i > n_layers + 1`.
    #[must_use]
    pub fn material(&self, i: usize) -> Material {
        self.materials[i]
    }

    /// The upper boundary of layer `i`, for `i in 0..=n_layers`.
    ///
    /// # Panics
    ///
    /// Panics if `i > n_layers`.
    #[must_use]
    pub fn upper_boundary(&self, i: usize) -> Float {
        self.z_boundaries[i]
    }

    /// The lower boundary of real layer `i` (`i in 1..=n_layers`), i.e. the
    /// upper boundary of layer `i + 1`.
    #[must_use]
    pub fn lower_boundary(&self, i: usize) -> Float {
        self.z_boundaries[i]
    }

    /// The layer index containing `z`. Interfaces belong to the layer
    /// above: the first layer whose upper boundary is `>= z`.
    #[must_use]
    pub fn layer_at(&self, z: Float) -> usize {
        for (i, &boundary) in self.z_boundaries.iter().enumerate() {
            if z <= boundary {
                return i;
            }
        }
        self.n_layers() + 1
    }
}

/// One layer's material and thickness, as seen while building a [`Sample`].
struct PendingLayer {
    material: Material,
    thickness: Float,
}

/// Incrementally constructs a [`Sample`] by appending layers and, optionally,
/// prelayers above the stack.
pub struct SampleBuilder {
    above: Material,
    below: Material,
    layers: Vec<PendingLayer>,
}

impl SampleBuilder {
    /// Appends a layer below the current stack.
    #[must_use]
    pub fn layer(mut self, material: Material, thickness: Float) -> Self {
        self.layers.push(PendingLayer {
            material,
            thickness,
        });
        self
    }

    /// Inserts a layer above the current stack (shifting every existing
    /// boundary down). Multiple calls stack in the order given: the most
    /// recently added prelayer ends up immediately above layer 0, matching
    /// the "reverse document order" rule in `# 6`.
    #[must_use]
    pub fn prelayer(mut self, material: Material, thickness: Float) -> Self {
        self.layers.insert(
            0,
            PendingLayer {
                material,
                thickness,
            },
        );
        self
    }

    /// Finishes construction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if no layers were added, or if any
    /// layer thickness is not finite and positive.
    pub fn build(self) -> Result<Sample> {
        if self.layers.is_empty() {
            return Err(Error::ConfigInvalid(
                "sample must contain at least one layer".to_string(),
            ));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if !(layer.thickness.is_finite() && layer.thickness > 0.0) {
                return Err(Error::ConfigInvalid(format!(
                    "layer {i} has non-positive or non-finite thickness"
                )));
            }
        }

        let mut materials = Vec::with_capacity(self.layers.len() + 2);
        materials.push(self.above);
        materials.extend(self.layers.iter().map(|l| l.material));
        materials.push(self.below);

        let mut z_boundaries = Vec::with_capacity(self.layers.len() + 1);
        let mut z = 0.0;
        z_boundaries.push(z);
        for layer in &self.layers {
            z += layer.thickness;
            z_boundaries.push(z);
        }

        Ok(Sample {
            materials,
            z_boundaries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glass() -> Material {
        Material::non_scattering(1.5)
    }

    fn tissue() -> Material {
        Material::new(0.1, 0.9, 1.4)
    }

    #[test]
    fn single_layer_boundaries() {
        let s = Sample::builder(Material::non_scattering(1.0), Material::non_scattering(1.0))
            .layer(tissue(), 1.0)
            .build()
            .unwrap();
        assert_eq!(s.n_layers(), 1);
        assert_eq!(s.upper_boundary(0), 0.0);
        assert_eq!(s.upper_boundary(1), 1.0);
    }

    #[test]
    fn layer_at_assigns_interfaces_to_layer_above() {
        let s = Sample::builder(Material::non_scattering(1.0), Material::non_scattering(1.0))
            .layer(tissue(), 1.0)
            .layer(glass(), 0.2)
            .build()
            .unwrap();
        assert_eq!(s.layer_at(-1.0), 0);
        assert_eq!(s.layer_at(0.0), 0); // boundary belongs to layer above
        assert_eq!(s.layer_at(0.5), 1);
        assert_eq!(s.layer_at(1.0), 1); // boundary belongs to layer above
        assert_eq!(s.layer_at(1.1), 2);
        assert_eq!(s.layer_at(1.2), 2); // boundary belongs to layer above
        assert_eq!(s.layer_at(5.0), 3); // below half-space
    }

    #[test]
    fn prelayers_shift_existing_boundaries() {
        let s = Sample::builder(Material::non_scattering(1.0), Material::non_scattering(1.0))
            .layer(tissue(), 1.0)
            .prelayer(glass(), 0.3)
            .build()
            .unwrap();
        assert_eq!(s.n_layers(), 2);
        assert_eq!(s.upper_boundary(0), 0.0);
        assert_eq!(s.upper_boundary(1), 0.3);
        assert_eq!(s.upper_boundary(2), 1.3);
        assert_eq!(s.material(1).n(), glass().n());
        assert_eq!(s.material(2).n(), tissue().n());
    }

    #[test]
    fn rejects_empty_sample() {
        let err = Sample::builder(Material::non_scattering(1.0), Material::non_scattering(1.0))
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn rejects_non_positive_thickness() {
        let err = Sample::builder(Material::non_scattering(1.0), Material::non_scattering(1.0))
            .layer(tissue(), 0.0)
            .build();
        assert!(err.is_err());
    }
}
