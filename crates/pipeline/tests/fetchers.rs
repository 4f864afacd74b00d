//! Scene fetchers against a local HTTP server.
//!
//! Band and SCL COGs are written with `s2cuts_core` and served with Range
//! support; the Process API endpoint answers every POST with a fixed
//! multi-band TIFF.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use chrono::{TimeZone, Utc};
use s2cuts_cloud::{CogReaderOptions, HttpClient, ProcessClient};
use s2cuts_core::io::{write_cog_to_buffer, CogWriteOptions};
use s2cuts_core::{GeoTransform, GridSpec, Raster, CRS};
use s2cuts_pipeline::catalog::BandAsset;
use s2cuts_pipeline::{CogFetcher, FetchRequest, HubFetcher, S2Band, SceneCandidate, SceneFetcher};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const UTM32N: u32 = 32632;

/// Serve `files` by path. GET honours `Range: bytes=a-b`; POST reads the
/// request body and answers with the `/process` entry.
async fn serve(files: HashMap<String, Vec<u8>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let files = Arc::new(files);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let files = Arc::clone(&files);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                let header_end = loop {
                    if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                };
                let head = String::from_utf8_lossy(&request[..header_end]).to_string();
                let lower = head.to_lowercase();

                let content_length = lower
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while request.len() < header_end + content_length {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let mut first = head.lines().next().unwrap_or_default().split_whitespace();
                let method = first.next().unwrap_or_default().to_string();
                let path = first.next().unwrap_or_default().to_string();
                let range = lower
                    .lines()
                    .find_map(|l| l.strip_prefix("range: bytes="))
                    .and_then(|r| {
                        let (a, b) = r.trim().split_once('-')?;
                        Some((a.parse::<usize>().ok()?, b.parse::<usize>().ok()?))
                    });

                let key = if method == "POST" { "/process".to_string() } else { path };
                let response = match (files.get(&key), range) {
                    (Some(data), Some((start, end))) if start < data.len() => {
                        let end = end.min(data.len() - 1);
                        let body = &data[start..=end];
                        let mut out = format!(
                            "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nConnection: close\r\n\r\n",
                            body.len(),
                            start,
                            end,
                            data.len()
                        )
                        .into_bytes();
                        out.extend_from_slice(body);
                        out
                    }
                    (Some(data), None) => {
                        let mut out = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: image/tiff\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            data.len()
                        )
                        .into_bytes();
                        out.extend_from_slice(data);
                        out
                    }
                    (Some(_), Some(_)) => {
                        b"HTTP/1.1 416 Range Not Satisfiable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec()
                    }
                    (None, _) => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
                };
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

/// 200 m x 200 m request grid at 20 m (10 x 10 cells).
fn request_grid() -> GridSpec {
    GridSpec::from_bounds((600000.0, 5000000.0, 600200.0, 5000200.0), 20.0, CRS::from_epsg(UTM32N)).unwrap()
}

fn utm_raster(data: Vec<f32>, size: usize, pixel: f64, nodata: Option<f32>) -> Raster<f32> {
    let mut raster = Raster::from_vec(data, size, size).unwrap();
    raster.set_transform(GeoTransform::new(600000.0, 5000200.0, pixel, -pixel));
    raster.set_crs(Some(CRS::from_epsg(UTM32N)));
    raster.set_nodata(nodata);
    raster
}

/// Digital number of the 10 m band at `(row, col)`; 0 at (1, 1).
fn dn(row: usize, col: usize) -> f32 {
    if (row, col) == (1, 1) {
        0.0
    } else {
        (1000 + row * 20 + col) as f32
    }
}

/// 20 x 20 band at 10 m, encoded with `nodata` in GDAL_NODATA.
fn band_cog(nodata: f32) -> Vec<u8> {
    let data = (0..400).map(|i| dn(i / 20, i % 20)).collect();
    let raster = utm_raster(data, 20, 10.0, Some(0.0));
    let options = CogWriteOptions {
        tile_size: 16,
        overviews: false,
        nodata,
        ..CogWriteOptions::default()
    };
    write_cog_to_buffer(&raster, &options).unwrap()
}

/// 10 x 10 SCL at 20 m: vegetation, with high cloud at (0, 9) and
/// cloud shadow at (9, 0).
fn scl_cog() -> Vec<u8> {
    let data = (0..100)
        .map(|i| match (i / 10, i % 10) {
            (0, 9) => 9.0,
            (9, 0) => 3.0,
            _ => 4.0,
        })
        .collect();
    let raster = utm_raster(data, 10, 20.0, Some(-9999.0));
    let options = CogWriteOptions {
        tile_size: 16,
        overviews: false,
        ..CogWriteOptions::default()
    };
    write_cog_to_buffer(&raster, &options).unwrap()
}

fn scene(assets: HashMap<S2Band, BandAsset>) -> SceneCandidate {
    let datetime = Utc.with_ymd_and_hms(2019, 1, 14, 10, 20, 0).unwrap();
    SceneCandidate {
        id: "S2B_32TPR_20190114_0_L2A".into(),
        datetime,
        date: datetime.date_naive(),
        cloud_cover: 5.0,
        epsg: Some(UTM32N),
        tile: Some("32TPR".into()),
        seq: 0,
        geometry: None,
        assets,
    }
}

fn asset(base: &str, name: &str, scale: f64, offset: f64, nodata: Option<f64>) -> BandAsset {
    BandAsset {
        href: format!("{base}/{name}"),
        scale,
        offset,
        nodata,
    }
}

fn http() -> HttpClient {
    HttpClient::new(Duration::from_secs(5), 0).unwrap()
}

#[tokio::test]
async fn test_cog_fetcher_reflectance_nodata_and_scl() {
    let mut files = HashMap::new();
    files.insert("/red.tif".to_string(), band_cog(0.0));
    files.insert("/nir.tif".to_string(), band_cog(f32::NAN));
    files.insert("/scl.tif".to_string(), scl_cog());
    let base = serve(files).await;

    let mut assets = HashMap::new();
    // red declares nodata 0 in the file itself
    assets.insert(S2Band::B04, asset(&base, "red.tif", 1e-4, -0.1, None));
    // nir declares nothing usable; reflectance bands fall back to 0
    assets.insert(S2Band::B08, asset(&base, "nir.tif", 1e-4, 0.0, None));
    // scale is ignored for the classification layer
    assets.insert(S2Band::Scl, asset(&base, "scl.tif", 1e-4, 0.0, None));
    let scene = scene(assets);

    let fetcher = CogFetcher::new(http(), CogReaderOptions::default());
    let request = FetchRequest {
        bands: vec![S2Band::B04, S2Band::B08],
        grid: request_grid(),
        geometry: false,
    };
    let data = fetcher.fetch(&scene, &request).await.unwrap();

    let red = data.band(S2Band::B04).unwrap();
    let nir = data.band(S2Band::B08).unwrap();
    for raster in [red, nir, &data.scl] {
        assert_eq!(raster.shape(), (10, 10));
        assert_eq!(raster.crs(), Some(&CRS::from_epsg(UTM32N)));
        assert_eq!(raster.transform().origin_x, 600000.0);
        assert_eq!(raster.transform().origin_y, 5000200.0);
    }

    // each 20 m cell samples the 10 m pixel under its centre
    for (row, col) in [(0, 1), (3, 4), (9, 9)] {
        let v = dn(2 * row + 1, 2 * col + 1);
        assert_relative_eq!(red.get(row, col).unwrap(), v * 1e-4 - 0.1, epsilon = 1e-6);
        assert_relative_eq!(nir.get(row, col).unwrap(), v * 1e-4, epsilon = 1e-6);
    }
    assert!(red.get(0, 0).unwrap().is_nan());
    assert!(nir.get(0, 0).unwrap().is_nan());

    assert_eq!(data.scl.get(0, 9).unwrap(), 9.0);
    assert_eq!(data.scl.get(9, 0).unwrap(), 3.0);
    assert_eq!(data.scl.get(5, 5).unwrap(), 4.0);
    assert!(data.geometry.is_none());
}

#[tokio::test]
async fn test_cog_fetcher_missing_asset_is_scene_error() {
    let base = serve(HashMap::new()).await;
    let mut assets = HashMap::new();
    assets.insert(S2Band::Scl, asset(&base, "scl.tif", 1.0, 0.0, None));

    let fetcher = CogFetcher::new(http(), CogReaderOptions::default());
    let request = FetchRequest {
        bands: vec![S2Band::B04],
        grid: request_grid(),
        geometry: false,
    };
    let err = fetcher.fetch(&scene(assets), &request).await.unwrap_err();
    assert!(!err.is_setup());
}

/// Chunky FLOAT32 TIFF holding B04, B08 and SCL for `grid`.
fn hub_response(grid: &GridSpec) -> Vec<u8> {
    use tiff::encoder::{colortype, TiffEncoder};
    let data: Vec<f32> = (0..grid.rows * grid.cols)
        .flat_map(|i| {
            let scl = if i == 0 { 9.0 } else { 4.0 };
            [0.05, 0.4, scl]
        })
        .collect();
    let mut buf = Cursor::new(Vec::new());
    TiffEncoder::new(&mut buf)
        .unwrap()
        .write_image::<colortype::RGB32Float>(grid.cols as u32, grid.rows as u32, &data)
        .unwrap();
    buf.into_inner()
}

#[tokio::test]
async fn test_hub_fetcher_small_aoi_render() {
    // 1 km box at 20 m, the smallest scenario the downloader targets
    let grid = GridSpec::from_bounds((600000.0, 5000000.0, 601000.0, 5001000.0), 20.0, CRS::from_epsg(UTM32N)).unwrap();
    let body = hub_response(&grid);
    assert!(body.len() < 64 * 1024);

    let mut files = HashMap::new();
    files.insert("/process".to_string(), body);
    let base = serve(files).await;

    let fetcher = HubFetcher::new(ProcessClient::new(http(), base), 20.0);
    let request = FetchRequest {
        bands: vec![S2Band::B04, S2Band::B08],
        grid,
        geometry: false,
    };
    let data = fetcher.fetch(&scene(HashMap::new()), &request).await.unwrap();

    let red = data.band(S2Band::B04).unwrap();
    let nir = data.band(S2Band::B08).unwrap();
    assert_eq!(red.shape(), (50, 50));
    assert_eq!(nir.crs(), Some(&CRS::from_epsg(UTM32N)));
    assert_eq!(red.transform().origin_y, 5001000.0);
    assert_relative_eq!(red.get(20, 20).unwrap(), 0.05);
    assert_relative_eq!(nir.get(49, 49).unwrap(), 0.4);
    assert_eq!(data.scl.get(0, 0).unwrap(), 9.0);
    assert_eq!(data.scl.get(0, 1).unwrap(), 4.0);
}
