//! Product assembly
//!
//! Turns fetched scene data into one masked, reprojected and AOI-clipped
//! raster per requested variable.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use geo::{BoundingRect, Contains, MultiPolygon, Point};
use ndarray::Array2;
use rayon::prelude::*;
use s2cuts_algorithms::biophysical::{apply_model, AngleGeometry, BiophysicalModel, BiophysicalVariable, SnapNetwork};
use s2cuts_algorithms::imagery::ndvi;
use s2cuts_algorithms::mask::{scl_valid_mask, MaskConfig};
use s2cuts_algorithms::warp::{target_grid, warp_nearest};
use s2cuts_core::crs::{transform_bounds, utm_epsg_for, Projection, CRS};
use s2cuts_core::raster::{GridSpec, Raster};
use tracing::debug;

use crate::aoi::AreaOfInterest;
use crate::catalog::SceneCandidate;
use crate::error::{PipelineError, Result};
use crate::fetch::{FetchRequest, SceneData};
use crate::variable::{required_bands, S2Band, Variable};

/// Native-CRS grid covering the AOI for `scene` at `resolution` metres.
///
/// The CRS is the scene's `proj:epsg`, or the UTM zone of the AOI centroid.
pub fn scene_grid(aoi: &AreaOfInterest, scene: &SceneCandidate, resolution: f64) -> Result<GridSpec> {
    let crs = match scene.epsg {
        Some(epsg) => CRS::from_epsg(epsg),
        None => {
            let (lon, lat) = aoi.centroid();
            CRS::from_epsg(utm_epsg_for(lon, lat))
        }
    };
    let projection = crs
        .projection()
        .map_err(|_| PipelineError::scene(&scene.id, format!("unsupported scene CRS {crs}")))?;
    let bounds = transform_bounds(&Projection::Geographic, &projection, aoi.bbox());
    Ok(GridSpec::from_bounds(bounds, resolution, crs)?)
}

/// Biophysical models keyed by variable.
#[derive(Clone, Default)]
pub struct ModelSet {
    models: HashMap<BiophysicalVariable, Arc<dyn BiophysicalModel>>,
}

impl ModelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `model` under its own variable, replacing any previous one.
    pub fn insert(&mut self, model: Arc<dyn BiophysicalModel>) {
        self.models.insert(model.variable(), model);
    }

    pub fn get(&self, variable: BiophysicalVariable) -> Option<&Arc<dyn BiophysicalModel>> {
        self.models.get(&variable)
    }

    /// Load SNAP coefficient files from `dir` for every biophysical
    /// variable in `variables`.
    pub fn load(dir: &Path, variables: &[Variable]) -> Result<Self> {
        let mut set = Self::new();
        for variable in variables {
            if let Variable::Biophysical(var) = variable {
                let network = SnapNetwork::load(dir, *var).map_err(|e| {
                    PipelineError::Model(format!("{}: {}", dir.join(var.file_name()).display(), e))
                })?;
                set.insert(Arc::new(network));
            }
        }
        Ok(set)
    }
}

impl std::fmt::Debug for ModelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.models.keys()).finish()
    }
}

/// Computes products from [`SceneData`].
#[derive(Debug, Clone)]
pub struct Assembler {
    variables: Vec<Variable>,
    mask: MaskConfig,
    target_crs: CRS,
    models: ModelSet,
}

impl Assembler {
    /// Fails if a biophysical variable has no model.
    pub fn new(variables: Vec<Variable>, mask: MaskConfig, target_crs: CRS, models: ModelSet) -> Result<Self> {
        for variable in &variables {
            if let Variable::Biophysical(var) = variable {
                if models.get(*var).is_none() {
                    return Err(PipelineError::Model(format!("no model registered for {}", var.name())));
                }
            }
        }
        target_crs
            .projection()
            .map_err(|_| PipelineError::TargetCrs(target_crs.to_string()))?;
        Ok(Self {
            variables,
            mask,
            target_crs,
            models,
        })
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Fetch request covering every variable on `grid`.
    pub fn fetch_request(&self, grid: GridSpec) -> FetchRequest {
        FetchRequest {
            bands: required_bands(&self.variables),
            grid,
            geometry: self.variables.iter().any(Variable::needs_geometry),
        }
    }

    /// One raster per variable, in the target CRS, with invalid SCL pixels
    /// and pixels outside the AOI set to NaN.
    pub fn assemble(&self, scene: &SceneCandidate, data: &SceneData, aoi: &AreaOfInterest) -> Result<Vec<(Variable, Raster<f32>)>> {
        let valid = scl_valid_mask(&data.scl, &self.mask)?;
        let scene_grid = data
            .scl
            .grid_spec()
            .ok_or_else(|| PipelineError::scene(&scene.id, "SCL raster has no CRS"))?;
        let out_grid = target_grid(&scene_grid, self.target_crs)?;
        let footprint = aoi.project(self.target_crs)?;
        let inside = aoi_mask(&out_grid, &footprint);

        debug!(
            scene = %scene.id,
            valid = valid.iter().filter(|v| **v).count(),
            rows = out_grid.rows,
            cols = out_grid.cols,
            "assembling products"
        );

        let geometry = data.geometry.or(scene.geometry);
        let mut products = Vec::with_capacity(self.variables.len());
        for variable in &self.variables {
            let mut raster = self.compute(scene, data, *variable, geometry.as_ref())?;
            raster.set_nodata(Some(f32::NAN));
            raster.apply_mask(&valid)?;
            let mut warped = warp_nearest(&raster, &out_grid)?;
            warped.apply_mask(&inside)?;
            products.push((*variable, warped));
        }
        Ok(products)
    }

    fn compute(
        &self,
        scene: &SceneCandidate,
        data: &SceneData,
        variable: Variable,
        geometry: Option<&AngleGeometry>,
    ) -> Result<Raster<f32>> {
        let band = |b: S2Band| {
            data.band(b)
                .ok_or_else(|| PipelineError::scene(&scene.id, format!("{b} not fetched")))
        };
        match variable {
            Variable::Band(b) => Ok(band(b)?.clone()),
            Variable::Ndvi => Ok(ndvi(band(S2Band::B08)?, band(S2Band::B04)?)?),
            Variable::Biophysical(var) => {
                let model = self
                    .models
                    .get(var)
                    .ok_or_else(|| PipelineError::Model(format!("no model registered for {}", var.name())))?;
                let geometry = geometry
                    .ok_or_else(|| PipelineError::scene(&scene.id, "sun/view angles unavailable"))?;
                let inputs = variable
                    .required_bands()
                    .into_iter()
                    .map(band)
                    .collect::<Result<Vec<_>>>()?;
                Ok(apply_model(model.as_ref(), &inputs, geometry)?)
            }
        }
    }
}

/// Cells of `grid` whose centre lies inside `footprint` (same CRS).
pub fn aoi_mask(grid: &GridSpec, footprint: &MultiPolygon<f64>) -> Array2<bool> {
    let Some(rect) = footprint.bounding_rect() else {
        return Array2::from_elem((grid.rows, grid.cols), false);
    };
    let data: Vec<bool> = (0..grid.rows)
        .into_par_iter()
        .flat_map_iter(|row| {
            (0..grid.cols).map(move |col| {
                let (x, y) = grid.pixel_center(row, col);
                if x < rect.min().x || x > rect.max().x || y < rect.min().y || y > rect.max().y {
                    return false;
                }
                footprint.contains(&Point::new(x, y))
            })
        })
        .collect();
    Array2::from_shape_vec((grid.rows, grid.cols), data)
        .unwrap_or_else(|_| Array2::from_elem((grid.rows, grid.cols), false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::candidate;
    use s2cuts_core::GeoTransform;

    struct ConstantModel(BiophysicalVariable, f32);

    impl BiophysicalModel for ConstantModel {
        fn variable(&self) -> BiophysicalVariable {
            self.0
        }

        fn predict(&self, bands: &[f32; 8], _geometry: &AngleGeometry) -> f32 {
            self.1 + bands[1]
        }
    }

    fn aoi() -> AreaOfInterest {
        AreaOfInterest::from_bbox("plot", (11.0, 46.0, 11.01, 46.01), CRS::wgs84()).unwrap()
    }

    fn scene_data(grid: &GridSpec, cloudy_rows: usize) -> SceneData {
        let band = |v: f32| {
            let mut r = Raster::from_grid(grid, v);
            r.set_nodata(Some(f32::NAN));
            r
        };
        let mut scl = band(4.0);
        for row in 0..cloudy_rows {
            for col in 0..grid.cols {
                scl.data_mut()[(row, col)] = 9.0;
            }
        }
        let bands = S2Band::ALL
            .iter()
            .filter(|b| **b != S2Band::Scl)
            .map(|b| (*b, band(if *b == S2Band::B08 { 0.5 } else { 0.1 })))
            .collect();
        SceneData {
            bands,
            scl,
            geometry: Some(AngleGeometry {
                sun_zenith: 40.0,
                sun_azimuth: 150.0,
                view_zenith: 5.0,
                view_azimuth: 100.0,
            }),
        }
    }

    #[test]
    fn test_scene_grid_is_snapped_utm() {
        let grid = scene_grid(&aoi(), &candidate("s", 14, 1.0), 20.0).unwrap();
        assert_eq!(grid.crs, CRS::from_epsg(32632));
        let gt = grid.transform;
        assert_eq!(gt.origin_x % 20.0, 0.0);
        assert_eq!(gt.origin_y % 20.0, 0.0);
        assert!(grid.cols >= 38 && grid.cols <= 43, "{}", grid.cols);
        assert!(grid.rows >= 55 && grid.rows <= 59, "{}", grid.rows);
    }

    #[test]
    fn test_scene_grid_falls_back_to_centroid_zone() {
        let mut scene = candidate("s", 14, 1.0);
        scene.epsg = None;
        let grid = scene_grid(&aoi(), &scene, 20.0).unwrap();
        assert_eq!(grid.crs, CRS::from_epsg(32632));
    }

    #[test]
    fn test_assemble_masks_clouds_and_outside_aoi() {
        let aoi = aoi();
        let scene = candidate("s", 14, 1.0);
        let grid = scene_grid(&aoi, &scene, 20.0).unwrap();
        let data = scene_data(&grid, 10);

        let mut models = ModelSet::new();
        models.insert(Arc::new(ConstantModel(BiophysicalVariable::Lai, 2.0)));
        let assembler = Assembler::new(
            vec![Variable::Ndvi, Variable::Biophysical(BiophysicalVariable::Lai), Variable::Band(S2Band::B04)],
            MaskConfig::default(),
            CRS::from_epsg(32632),
            models,
        )
        .unwrap();

        let products = assembler.assemble(&scene, &data, &aoi).unwrap();
        assert_eq!(products.len(), 3);
        for (variable, raster) in &products {
            assert_eq!(raster.shape(), (grid.rows, grid.cols));
            for col in 0..grid.cols {
                assert!(raster.data()[(0, col)].is_nan(), "{variable} row 0 should be masked");
            }
            assert!(raster.valid_count() > 0, "{variable} has no valid pixel");
        }
        let (_, ndvi) = &products[0];
        let (_, lai) = &products[1];
        let r = grid.rows - 20;
        let c = grid.cols / 2;
        assert!((ndvi.data()[(r, c)] - 0.4 / 0.6).abs() < 1e-5);
        assert!((lai.data()[(r, c)] - 2.1).abs() < 1e-5);
    }

    #[test]
    fn test_assemble_reprojects_to_wgs84() {
        let aoi = aoi();
        let scene = candidate("s", 14, 1.0);
        let grid = scene_grid(&aoi, &scene, 20.0).unwrap();
        let assembler = Assembler::new(vec![Variable::Ndvi], MaskConfig::default(), CRS::wgs84(), ModelSet::new()).unwrap();
        let products = assembler.assemble(&scene, &scene_data(&grid, 0), &aoi).unwrap();
        let (_, raster) = &products[0];
        assert_eq!(raster.crs(), Some(&CRS::wgs84()));
        let (w, s, e, n) = raster.bounds();
        assert!(w <= 11.0 && e >= 11.01 && s <= 46.0 && n >= 46.01);
        assert!(raster.valid_count() > 0);
    }

    #[test]
    fn test_missing_model_is_setup_error() {
        let err = Assembler::new(
            vec![Variable::Biophysical(BiophysicalVariable::Ccc)],
            MaskConfig::default(),
            CRS::wgs84(),
            ModelSet::new(),
        )
        .unwrap_err();
        assert!(err.is_setup());
    }

    #[test]
    fn test_aoi_mask_triangle() {
        let grid = GridSpec::new(GeoTransform::new(0.0, 10.0, 1.0, -1.0), 10, 10, CRS::from_epsg(32632));
        let triangle = MultiPolygon::new(vec![geo::Polygon::new(
            vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (0.0, 0.0)].into(),
            vec![],
        )]);
        let mask = aoi_mask(&grid, &triangle);
        assert!(mask[(9, 0)]);
        assert!(!mask[(0, 9)]);
        assert_eq!(mask.iter().filter(|v| **v).count(), 45);
    }
}
