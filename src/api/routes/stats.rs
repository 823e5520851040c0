use std::path::{Path as FsPath, PathBuf};

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::api::state::AppState;
use crate::api::ApiError;
use crate::calculate::PairKind;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Top-level artifacts currently published
    pub published: Vec<String>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let layout = &state.layout;
    let published = [
        &layout.win_rates,
        &layout.star_rates,
        &layout.rank_match_counts,
        &layout.pair_dir,
        &layout.trio_dir,
        &layout.three_vs_three_dir,
    ]
    .into_iter()
    .filter(|artifact| state.artifact(artifact).exists())
    .map(|artifact| artifact.display().to_string())
    .collect();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        published,
    })
}

/// Partition stems are `<map>` or `<map>-r<rank>`.
fn validate_partition(partition: &str) -> Result<&str, ApiError> {
    let valid = !partition.is_empty()
        && partition
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase() || b == b'-');
    if valid {
        Ok(partition)
    } else {
        Err(ApiError::BadRequest(format!("Invalid partition: {}", partition)))
    }
}

async fn read_artifact(state: &AppState, relative: PathBuf) -> Result<Json<Value>, ApiError> {
    let path = state.artifact(&relative);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(relative.display().to_string()))
        }
        Err(e) => return Err(ApiError::Internal(format!("{}: {}", path.display(), e))),
    };
    let json = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::Internal(format!("{}: {}", path.display(), e)))?;
    Ok(Json(json))
}

pub async fn win_rates(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let path = state.layout.win_rates.clone();
    read_artifact(&state, path).await
}

pub async fn star_rates(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let path = state.layout.star_rates.clone();
    read_artifact(&state, path).await
}

pub async fn rank_match_counts(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let path = state.layout.rank_match_counts.clone();
    read_artifact(&state, path).await
}

pub async fn pair_stats(
    State(state): State<AppState>,
    Path((kind, partition)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let kind: PairKind = kind.parse().map_err(ApiError::BadRequest)?;
    let partition = validate_partition(&partition)?;
    let path = state.layout.pair_file(kind, partition);
    read_artifact(&state, path).await
}

pub async fn trio_stats(
    State(state): State<AppState>,
    Path(partition): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let partition = validate_partition(&partition)?;
    let path = state.layout.trio_file(partition);
    read_artifact(&state, path).await
}

pub async fn three_vs_three_stats(
    State(state): State<AppState>,
    Path(partition): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let partition = validate_partition(&partition)?;
    let path = state.layout.three_vs_three_file(partition);
    read_artifact(&state, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_router;
    use crate::export::OutputLayout;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::util::ServiceExt;

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    fn write_json(root: &FsPath, relative: &str, value: &Value) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string(value).unwrap()).unwrap();
    }

    fn setup_test_state(dir: &FsPath) -> AppState {
        AppState::new(dir.to_path_buf(), OutputLayout::default())
    }

    #[tokio::test]
    async fn test_health_lists_published_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        write_json(tmp.path(), "win_rates.json", &json!({}));
        std::fs::create_dir_all(tmp.path().join("trio_stats")).unwrap();

        let (status, json) = get_json(build_router(setup_test_state(tmp.path())), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["published"], json!(["win_rates.json", "trio_stats"]));
    }

    #[tokio::test]
    async fn test_win_rates_served_as_written() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = json!({"15000007": {"16000000": {"games": 4, "wins": 3, "win_rate": 0.75, "win_rate_lcb": 0.41}}});
        write_json(tmp.path(), "win_rates.json", &doc);

        let (status, json) =
            get_json(build_router(setup_test_state(tmp.path())), "/api/stats/win-rates").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, doc);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let (status, json) =
            get_json(build_router(setup_test_state(tmp.path())), "/api/stats/star-rates").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_partition_files() {
        let tmp = tempfile::tempdir().unwrap();
        write_json(tmp.path(), "pair_stats/synergy/7-r4.json", &json!({"1": {}}));
        write_json(tmp.path(), "trio_stats/7.json", &json!([1]));
        write_json(tmp.path(), "three_vs_three_stats/7.json", &json!([2]));
        let app = build_router(setup_test_state(tmp.path()));

        let (status, json) = get_json(app.clone(), "/api/stats/pairs/synergy/7-r4").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({"1": {}}));

        let (_, json) = get_json(app.clone(), "/api/stats/trios/7").await;
        assert_eq!(json, json!([1]));

        let (_, json) = get_json(app.clone(), "/api/stats/three-vs-three/7").await;
        assert_eq!(json, json!([2]));

        let (status, _) = get_json(app, "/api/stats/pairs/matchup/7-r4").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_partition_and_kind() {
        let tmp = tempfile::tempdir().unwrap();
        write_json(tmp.path(), "secret.json", &json!({}));
        let app = build_router(setup_test_state(tmp.path()));

        let (status, json) = get_json(app.clone(), "/api/stats/trios/..%2F..%2Fsecret").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");

        let (status, _) = get_json(app.clone(), "/api/stats/trios/Seven").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(app, "/api/stats/pairs/rivalry/7").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_validate_partition() {
        assert!(validate_partition("15000007").is_ok());
        assert!(validate_partition("15000007-r4").is_ok());
        assert!(validate_partition("").is_err());
        assert!(validate_partition("../x").is_err());
        assert!(validate_partition("a.json").is_err());
    }
}
