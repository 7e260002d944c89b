//! Layered overlay of several maps onto one base grid.

use crate::types::{MapError, MapResult};
use std::fmt;
use std::sync::Arc;

use super::map::{GenericMap, ReprojectParams};
use super::render::RenderItem;

/// Opaque identifier of a layer inside one composite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerHandle(u64);

impl fmt::Display for LayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Display options given when a layer is added
#[derive(Debug, Clone)]
pub struct LayerOptions {
    /// Drawing position; appended above the current top layer when `None`
    pub z_order: Option<i32>,
    pub visible: bool,
    /// Opacity in [0, 1]
    pub alpha: f64,
    /// Colour map override; the map's own plot settings are used when `None`
    pub cmap: Option<String>,
    /// Draw as contours at these levels instead of an image
    pub levels: Option<Vec<f64>>,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            z_order: None,
            visible: true,
            alpha: 1.0,
            cmap: None,
            levels: None,
        }
    }
}

/// One map with its per-layer display configuration
#[derive(Debug, Clone)]
pub struct Layer {
    handle: LayerHandle,
    map: Arc<GenericMap>,
    pub visible: bool,
    pub alpha: f64,
    pub z_order: i32,
    pub cmap: Option<String>,
    pub levels: Option<Vec<f64>>,
}

impl Layer {
    pub fn handle(&self) -> LayerHandle {
        self.handle
    }

    pub fn map(&self) -> &Arc<GenericMap> {
        &self.map
    }
}

fn check_alpha(alpha: f64) -> MapResult<()> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(MapError::InvalidParameter(format!(
            "layer alpha must lie in [0, 1], got {}",
            alpha
        )));
    }
    Ok(())
}

/// Maps drawn on top of each other, all resampled onto the base layer's grid
#[derive(Debug, Clone, Default)]
pub struct CompositeMap {
    layers: Vec<Layer>,
    base: Option<LayerHandle>,
    next_handle: u64,
    reproject: ReprojectParams,
}

impl CompositeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composite of `maps` stacked in the given order, first one as base
    pub fn from_maps<I>(maps: I) -> Self
    where
        I: IntoIterator<Item = GenericMap>,
    {
        let mut composite = Self::new();
        for map in maps {
            composite.push(Arc::new(map), LayerOptions::default());
        }
        composite
    }

    /// Parameters used when reprojecting layers onto the base grid
    pub fn with_reproject_params(mut self, params: ReprojectParams) -> Self {
        self.reproject = params;
        self
    }

    fn push(&mut self, map: Arc<GenericMap>, options: LayerOptions) -> LayerHandle {
        let handle = LayerHandle(self.next_handle);
        self.next_handle += 1;

        let z_order = options.z_order.unwrap_or_else(|| {
            self.layers
                .iter()
                .map(|layer| layer.z_order)
                .max()
                .map_or(0, |top| top + 1)
        });

        self.layers.push(Layer {
            handle,
            map,
            visible: options.visible,
            alpha: options.alpha,
            z_order,
            cmap: options.cmap,
            levels: options.levels,
        });
        if self.base.is_none() {
            self.base = Some(handle);
        }
        handle
    }

    /// Add a layer; maps may be shared between composites through `Arc`
    pub fn add_layer(
        &mut self,
        map: impl Into<Arc<GenericMap>>,
        options: LayerOptions,
    ) -> MapResult<LayerHandle> {
        check_alpha(options.alpha)?;
        let map = map.into();
        let handle = self.push(map, options);
        log::debug!("Added {} ({} layers)", handle, self.layers.len());
        Ok(handle)
    }

    fn position(&self, handle: LayerHandle) -> MapResult<usize> {
        self.layers
            .iter()
            .position(|layer| layer.handle == handle)
            .ok_or(MapError::LayerNotFound(handle.0))
    }

    fn layer_mut(&mut self, handle: LayerHandle) -> MapResult<&mut Layer> {
        let index = self.position(handle)?;
        Ok(&mut self.layers[index])
    }

    /// Remove a layer and hand back its map.
    ///
    /// Removing the base layer promotes the earliest remaining layer.
    pub fn remove_layer(&mut self, handle: LayerHandle) -> MapResult<Arc<GenericMap>> {
        let index = self.position(handle)?;
        let removed = self.layers.remove(index);
        if self.base == Some(handle) {
            self.base = self.layers.first().map(|layer| layer.handle);
            if let Some(base) = self.base {
                log::info!("Base {} removed, {} is the new base", handle, base);
            }
        }
        Ok(removed.map)
    }

    pub fn set_visible(&mut self, handle: LayerHandle, visible: bool) -> MapResult<()> {
        self.layer_mut(handle)?.visible = visible;
        Ok(())
    }

    pub fn set_alpha(&mut self, handle: LayerHandle, alpha: f64) -> MapResult<()> {
        check_alpha(alpha)?;
        self.layer_mut(handle)?.alpha = alpha;
        Ok(())
    }

    pub fn set_levels(&mut self, handle: LayerHandle, levels: Option<Vec<f64>>) -> MapResult<()> {
        self.layer_mut(handle)?.levels = levels;
        Ok(())
    }

    /// Move a layer to drawing position `z_order` (higher draws later)
    pub fn reorder(&mut self, handle: LayerHandle, z_order: i32) -> MapResult<()> {
        self.layer_mut(handle)?.z_order = z_order;
        Ok(())
    }

    /// Use `handle`'s grid as the common grid of the render plan
    pub fn set_base(&mut self, handle: LayerHandle) -> MapResult<()> {
        self.position(handle)?;
        self.base = Some(handle);
        Ok(())
    }

    pub fn base_layer(&self) -> Option<&Layer> {
        self.base
            .and_then(|handle| self.layers.iter().find(|layer| layer.handle == handle))
    }

    pub fn layer(&self, handle: LayerHandle) -> MapResult<&Layer> {
        Ok(&self.layers[self.position(handle)?])
    }

    /// Layers in insertion order
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Visible layers back to front, each resampled onto the base layer's grid.
    ///
    /// Layers with equal z-order keep their insertion order. Fails with
    /// `FrameMismatch` when a layer cannot be converted into the base frame.
    pub fn render_plan(&self) -> MapResult<Vec<RenderItem>> {
        let base = match self.base_layer() {
            Some(base) => base.map.clone(),
            None => return Ok(Vec::new()),
        };
        let target = base.coordinate_engine();

        let mut ordered: Vec<&Layer> = self.layers.iter().filter(|layer| layer.visible).collect();
        ordered.sort_by_key(|layer| layer.z_order);

        log::info!(
            "Render plan: {} of {} layers visible, base grid {:?}",
            ordered.len(),
            self.layers.len(),
            target.shape()
        );

        ordered
            .into_iter()
            .map(|layer| {
                let aligned = if layer.map.coordinate_engine() == target {
                    (*layer.map).clone()
                } else {
                    log::debug!("Reprojecting {} ({}) onto base grid", layer.handle, layer.map.nickname());
                    layer.map.reproject_to(target, &self.reproject)?
                };

                let mut item = aligned.to_render_item();
                if let Some(cmap) = &layer.cmap {
                    item.display.cmap = cmap.clone();
                }
                item.display.alpha = layer.alpha;
                item.display.z_order = layer.z_order;
                item.display.levels = layer.levels.clone();
                Ok(item)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::header::{MetaDict, RawImageInput};
    use crate::types::AU_METERS;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn map_with(value: f64, scale: f64) -> GenericMap {
        let header = MetaDict::new()
            .with("date-obs", "2022-01-01T00:00:00")
            .with("ctype1", "HPLN-TAN")
            .with("ctype2", "HPLT-TAN")
            .with("cunit1", "arcsec")
            .with("cunit2", "arcsec")
            .with("cdelt1", scale)
            .with("cdelt2", scale)
            .with("crpix1", 4.5)
            .with("crpix2", 4.5)
            .with("crval1", 0.0)
            .with("crval2", 0.0)
            .with("hgln_obs", 0.0)
            .with("hglt_obs", 0.0)
            .with("dsun_obs", AU_METERS);
        GenericMap::from_raw(RawImageInput::new(Array2::from_elem((8, 8), value), header)).unwrap()
    }

    #[test]
    fn test_default_z_order_appends() {
        let mut composite = CompositeMap::new();
        let a = composite.add_layer(map_with(1.0, 1.0), LayerOptions::default()).unwrap();
        let b = composite.add_layer(map_with(2.0, 1.0), LayerOptions::default()).unwrap();
        assert_eq!(composite.layer(a).unwrap().z_order, 0);
        assert_eq!(composite.layer(b).unwrap().z_order, 1);
        assert_eq!(composite.base_layer().unwrap().handle(), a);
    }

    #[test]
    fn test_render_plan_order_and_visibility() {
        let mut composite = CompositeMap::new();
        let a = composite.add_layer(map_with(1.0, 1.0), LayerOptions::default()).unwrap();
        let b = composite.add_layer(map_with(2.0, 1.0), LayerOptions::default()).unwrap();
        composite.add_layer(map_with(3.0, 1.0), LayerOptions::default()).unwrap();

        composite.reorder(a, 10).unwrap();
        composite.set_visible(b, false).unwrap();

        let plan = composite.render_plan().unwrap();
        let values: Vec<f64> = plan.iter().map(|item| item.data[[0, 0]]).collect();
        assert_eq!(values, vec![3.0, 1.0]);
        assert_eq!(plan[1].display.z_order, 10);

        // Hidden layers stay in the composite
        assert_eq!(composite.len(), 3);
        composite.set_visible(b, true).unwrap();
        assert_eq!(composite.render_plan().unwrap().len(), 3);
    }

    #[test]
    fn test_layers_are_resampled_onto_base_grid() {
        let mut composite = CompositeMap::new();
        composite.add_layer(map_with(1.0, 1.0), LayerOptions::default()).unwrap();
        composite
            .add_layer(
                map_with(5.0, 0.5),
                LayerOptions {
                    alpha: 0.5,
                    levels: Some(vec![2.0, 4.0]),
                    ..LayerOptions::default()
                },
            )
            .unwrap();

        let plan = composite.render_plan().unwrap();
        assert_eq!(plan[1].data.dim(), (8, 8));
        assert_eq!(plan[1].display.extent, plan[0].display.extent);
        assert_eq!(plan[1].display.alpha, 0.5);
        assert_eq!(plan[1].display.levels, Some(vec![2.0, 4.0]));
        // The finer layer only covers the centre of the base grid
        assert!(plan[1].data[[0, 0]].is_nan());
        assert_abs_diff_eq!(plan[1].data[[4, 4]], 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_removing_base_promotes_next_layer() {
        let mut composite = CompositeMap::new();
        let a = composite.add_layer(map_with(1.0, 1.0), LayerOptions::default()).unwrap();
        let b = composite.add_layer(map_with(2.0, 1.0), LayerOptions::default()).unwrap();
        let removed = composite.remove_layer(a).unwrap();
        assert_eq!(removed.data()[[0, 0]], 1.0);
        assert_eq!(composite.base_layer().unwrap().handle(), b);

        assert!(matches!(
            composite.remove_layer(a),
            Err(MapError::LayerNotFound(_))
        ));
        assert!(composite.set_alpha(b, 1.5).is_err());
    }

    #[test]
    fn test_shared_maps_are_not_mutated() {
        let shared = Arc::new(map_with(7.0, 1.0));
        let mut first = CompositeMap::new();
        let mut second = CompositeMap::new();
        let h1 = first.add_layer(shared.clone(), LayerOptions::default()).unwrap();
        second.add_layer(shared.clone(), LayerOptions::default()).unwrap();

        first.set_visible(h1, false).unwrap();
        first.remove_layer(h1).unwrap();
        assert_eq!(second.render_plan().unwrap().len(), 1);
        assert_eq!(Arc::strong_count(&shared), 2);
    }
}
