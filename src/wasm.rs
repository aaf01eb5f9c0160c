//! Browser bindings: thin wrappers that hand host bytes to the core and
//! return plain JS values.

use crate::artifact::RigArtifact;
use crate::clean::clean_point_cloud;
use crate::config::RigConfig;
use crate::pipeline::BindJob;
use crate::ply::PlyData;
use crate::progress::{LogProgress, ProgressUpdate};
use crate::rig::partition_by_key;
use crate::skeleton::CharacterDesc;
use crate::splat::{SplatBuffer, SplatScene};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

cfg_if::cfg_if! {
    if #[cfg(debug_assertions)] {
        const LOG_LEVEL: log::Level = log::Level::Debug;
    } else {
        const LOG_LEVEL: log::Level = log::Level::Info;
    }
}

fn now_ms() -> Option<f64> {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
}

fn config_from(json: Option<String>) -> Result<RigConfig, JsError> {
    match json {
        Some(json) => RigConfig::from_json(&json).map_err(|e| JsError::new(&e.to_string())),
        None => Ok(RigConfig::default()),
    }
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsError> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsError::new(&e.to_string()))
}

fn decode(bytes: &[u8], config: &RigConfig) -> Result<PlyData, JsError> {
    let start = now_ms();
    let ply = PlyData::decode(bytes, Some(bytes.len()), config, &mut LogProgress)
        .map_err(|e| JsError::new(&e.to_string()))?;
    if let (Some(start), Some(end)) = (start, now_ms()) {
        log::debug!("Decoded {} splats in {:.1} ms", ply.vertex_count(), end - start);
    }
    Ok(ply)
}

/// Resolve on the next macrotask so the page can render and handle input.
async fn yield_to_host() -> Result<(), JsError> {
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        let scheduled = web_sys::window().map(|w| {
            w.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, 0)
                .is_ok()
        });
        if scheduled != Some(true) {
            // No window (worker or failed timer): continue on the microtask queue
            resolve.call0(&JsValue::NULL).ok();
        }
    });
    JsFuture::from(promise)
        .await
        .map(|_| ())
        .map_err(|e| JsError::new(&format!("yield failed: {:?}", e)))
}

fn report(on_progress: Option<&js_sys::Function>, update: &ProgressUpdate) {
    match on_progress {
        Some(callback) => {
            if let Err(e) = callback.call1(&JsValue::NULL, &JsValue::from_str(&update.to_string())) {
                log::warn!("Progress callback failed: {:?}", e);
            }
        }
        None => log::info!("{}", update),
    }
}

/// Install the console logger and panic hook
#[wasm_bindgen]
pub fn init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(LOG_LEVEL).ok();
}

/// Number of splats in a binary PLY
#[wasm_bindgen]
pub fn point_count(bytes: &[u8]) -> Result<u32, JsError> {
    Ok(decode(bytes, &RigConfig::default())?.vertex_count() as u32)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CleanOutput {
    /// Subject PLY, then background PLY when there is one
    outputs: Vec<Vec<u8>>,
    centroid: [f32; 2],
    floor: f32,
    top: f32,
}

/// Split a capture into subject and background point clouds
#[wasm_bindgen]
pub fn clean_capture(bytes: &[u8], config_json: Option<String>) -> Result<JsValue, JsError> {
    let config = config_from(config_json)?;
    let ply = decode(bytes, &config)?;
    let result = clean_point_cloud(&ply, &config).map_err(|e| JsError::new(&e.to_string()))?;
    to_js(&CleanOutput {
        outputs: result.encode(&ply),
        centroid: result.centroid.to_array(),
        floor: result.heights.floor,
        top: result.heights.top,
    })
}

/// Bind a Gaussian PLY to a host-described character.
///
/// Every batch of `yieldBatch` iterations hands control back to the event
/// loop; `on_progress` receives text such as `"40.0% (1/3)"`. Resolves to
/// the rig metadata record.
#[wasm_bindgen]
pub async fn bind_capture(
    character_json: String,
    ply_bytes: Vec<u8>,
    config_json: Option<String>,
    on_progress: Option<js_sys::Function>,
) -> Result<JsValue, JsError> {
    let config = config_from(config_json)?;
    let character = CharacterDesc::from_json(&character_json)
        .and_then(CharacterDesc::build)
        .map_err(|e| JsError::new(&e.to_string()))?;
    let ply = decode(&ply_bytes, &config)?;
    let mut splats = SplatBuffer::from_ply(&ply).map_err(|e| JsError::new(&e.to_string()))?;

    let start = now_ms();
    let mut job = BindJob::new(&character, &mut splats, &SplatScene::default(), &config)
        .map_err(|e| JsError::new(&e.to_string()))?;
    while let Some(update) = job.step() {
        report(on_progress.as_ref(), &update);
        yield_to_host().await?;
    }
    let result = job.finish().map_err(|e| JsError::new(&e.to_string()))?;
    if let (Some(start), Some(end)) = (start, now_ms()) {
        log::info!("Bound {} splats in {:.1} ms", result.artifact.splat_count(), end - start);
    }
    to_js(&result.artifact)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SplitRig {
    /// Bone id owning each partition
    bones: Vec<usize>,
    /// One PLY per partition
    point_clouds: Vec<Vec<u8>>,
    /// Metadata reindexed to partition order
    artifact: RigArtifact,
    coarse: bool,
}

/// Partition a saved rig's point cloud by bone
#[wasm_bindgen]
pub fn split_rig(ply_bytes: &[u8], data_json: &str) -> Result<JsValue, JsError> {
    let artifact = RigArtifact::from_json(data_json).map_err(|e| JsError::new(&e.to_string()))?;
    let ply = decode(ply_bytes, &RigConfig::default())?;
    if ply.vertex_count() != artifact.splat_count() {
        return Err(JsError::new(&format!(
            "point cloud has {} splats, metadata describes {}",
            ply.vertex_count(),
            artifact.splat_count()
        )));
    }

    let partition = partition_by_key(&artifact.bones());
    log::info!("Split rig into {} partitions", partition.len());
    to_js(&SplitRig {
        bones: partition.keys.clone(),
        point_clouds: partition.split_point_cloud(&ply),
        artifact: artifact.reindexed(&partition),
        coarse: partition.is_coarse(),
    })
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;
    wasm_bindgen_test_configure!(run_in_browser);

    const PLY: &[u8] = b"ply\nformat binary_little_endian 1.0\nelement vertex 2\nproperty float x\nproperty float y\nproperty float z\nend_header\n\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x80?\0\0\0\0\0\0\0\0";

    #[wasm_bindgen_test]
    fn test_point_count() {
        init();
        assert_eq!(point_count(PLY).unwrap(), 2);
    }

    #[wasm_bindgen_test]
    async fn test_yield_returns_to_event_loop() {
        assert!(yield_to_host().await.is_ok());
    }

    #[wasm_bindgen_test]
    async fn test_bind_capture_rejects_bad_character() {
        assert!(bind_capture("{}".into(), PLY.to_vec(), None, None).await.is_err());
    }

    #[wasm_bindgen_test]
    fn test_split_rig() {
        let data = r#"{"modelScale":1,"gsQuaternion":[0,0,1,0],"splatVertexIndices":[0,1],"splatBoneIndices":[4,2],"splatRelativePoses":[0,0,0,0,0,0]}"#;
        assert!(split_rig(PLY, data).is_ok());
        assert!(split_rig(PLY, "{}").is_err());
    }
}
