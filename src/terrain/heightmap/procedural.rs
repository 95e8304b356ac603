use std::sync::Arc;

use super::Heightmap;

/// Height function sampled at integer grid positions.
pub type HeightFunction = Arc<dyn Fn(f64, f64) -> f32 + Send + Sync>;

/// Unbounded heightmap evaluating a function at `(x * spacing, y * spacing)`.
#[derive(Clone)]
pub struct ProceduralHeightmap {
    function: HeightFunction,
    spacing: f64,
}

impl ProceduralHeightmap {
    pub fn new(function: impl Fn(f64, f64) -> f32 + Send + Sync + 'static) -> Self {
        Self {
            function: Arc::new(function),
            spacing: 1.0,
        }
    }

    pub fn from_shared(function: HeightFunction) -> Self {
        Self {
            function,
            spacing: 1.0,
        }
    }

    /// Distance in function space between neighbouring samples.
    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing;
        self
    }
}

impl Heightmap for ProceduralHeightmap {
    fn height(&self, x: i32, y: i32) -> f32 {
        (self.function)(x as f64 * self.spacing, y as f64 * self.spacing)
    }

    fn size(&self) -> Option<usize> {
        None
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_function_at_spacing() {
        let map = ProceduralHeightmap::new(|x, y| (x + 10.0 * y) as f32).with_spacing(2.0);
        assert_eq!(map.height(1, 1), 22.0);
        assert_eq!(map.height(-3, 0), -6.0);
        assert_eq!(map.size(), None);
        assert!(map.is_ready());
    }
}
