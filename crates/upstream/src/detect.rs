//! Client for the object-detection inference endpoint (a DeepDetect-style
//! `/predict` API).

use std::path::{Path, PathBuf};

use reqwest::multipart;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mount point under which the inference server sees the storage directory.
const REMOTE_DATA_PREFIX: &str = "/data/";

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("failed to read image {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("detection request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("detection response was not valid JSON")]
    Decode(#[from] serde_json::Error),
}

/// How the image is handed to the inference server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DetectMode {
    /// POST a JSON body naming the image under the server's data mount.
    JsonPath,
    /// POST the image bytes as a multipart upload.
    Upload,
}

/// Client for one inference service on a detection server.
#[derive(Clone)]
pub struct DetectClient {
    http: reqwest::Client,
    url: String,
    service: String,
    confidence_threshold: f64,
    mode: DetectMode,
}

impl DetectClient {
    pub fn new(
        http: reqwest::Client,
        url: impl Into<String>,
        service: impl Into<String>,
        confidence_threshold: f64,
        mode: DetectMode,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            service: service.into(),
            confidence_threshold,
            mode,
        }
    }

    /// Run detection on a stored image and decode the prediction response.
    ///
    /// `file_name` is the name the inference server sees under its data
    /// mount; `local_path` is where the bytes live on this host (read only
    /// in [`DetectMode::Upload`]).
    pub async fn detect(
        &self,
        file_name: &str,
        local_path: &Path,
    ) -> Result<PredictionResponse, DetectError> {
        let sent = match self.mode {
            DetectMode::JsonPath => {
                let payload = self.json_payload(file_name);
                self.http.post(&self.url).json(&payload).send().await
            }
            DetectMode::Upload => {
                let bytes =
                    tokio::fs::read(local_path)
                        .await
                        .map_err(|source| DetectError::Read {
                            path: local_path.to_path_buf(),
                            source,
                        })?;
                let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
                let form = multipart::Form::new().part("file", part);
                self.http.post(&self.url).multipart(form).send().await
            }
        };

        // The server reports its own failures inside the JSON body (with an
        // empty prediction list), so the status code is not inspected here.
        let response = sent.map_err(|source| DetectError::Request {
            url: self.url.clone(),
            source,
        })?;
        let body = response.text().await.map_err(|source| DetectError::Request {
            url: self.url.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&body)?)
    }

    fn json_payload<'a>(&'a self, file_name: &str) -> PredictRequest<'a> {
        PredictRequest {
            service: &self.service,
            parameters: PredictParameters {
                input: InputParameters {},
                output: OutputParameters {
                    confidence_threshold: self.confidence_threshold,
                    bbox: true,
                },
                mllib: MllibParameters { gpu: false },
            },
            data: [format!("{REMOTE_DATA_PREFIX}{file_name}")],
        }
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    service: &'a str,
    parameters: PredictParameters,
    data: [String; 1],
}

#[derive(Serialize)]
struct PredictParameters {
    input: InputParameters,
    output: OutputParameters,
    mllib: MllibParameters,
}

#[derive(Serialize)]
struct InputParameters {}

#[derive(Serialize)]
struct OutputParameters {
    confidence_threshold: f64,
    bbox: bool,
}

#[derive(Serialize)]
struct MllibParameters {
    gpu: bool,
}

/// Top-level `/predict` response.
#[derive(Debug, Deserialize)]
pub struct PredictionResponse {
    pub status: ResponseStatus,
    pub head: Option<ResponseHead>,
    #[serde(default)]
    pub body: PredictionBody,
}

#[derive(Debug, Deserialize)]
pub struct ResponseStatus {
    pub code: i32,
    pub msg: String,
}

#[derive(Debug, Deserialize)]
pub struct ResponseHead {
    pub method: String,
    pub service: String,
    pub time: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct PredictionBody {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

/// Predictions for one submitted image.
#[derive(Debug, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub classes: Vec<PredictedClass>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// One detected object: a labeled, scored bounding box.
#[derive(Debug, Deserialize)]
pub struct PredictedClass {
    pub bbox: BoundingBox,
    pub prob: f64,
    pub cat: String,
    #[serde(default)]
    pub last: bool,
}

#[derive(Debug, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{contains, refused_url, spawn_stub};

    const PERSON_RESPONSE: &str = r#"{
        "status": {"code": 200, "msg": "OK"},
        "head": {"method": "/predict", "service": "detection_600", "time": 852.0},
        "body": {
            "predictions": [
                {
                    "uri": "/data/upload-door.jpg",
                    "classes": [
                        {
                            "bbox": {"xmin": 12.0, "ymin": 8.5, "xmax": 140.0, "ymax": 260.25},
                            "prob": 0.92,
                            "cat": "Person",
                            "last": true
                        }
                    ],
                    "images": []
                }
            ]
        }
    }"#;

    fn client(url: &str, mode: DetectMode) -> DetectClient {
        DetectClient::new(reqwest::Client::new(), url, "detection_600", 0.3, mode)
    }

    #[test]
    fn decodes_a_full_prediction_response() {
        let decoded: PredictionResponse = serde_json::from_str(PERSON_RESPONSE).unwrap();
        assert_eq!(decoded.status.code, 200);
        assert_eq!(decoded.head.unwrap().service, "detection_600");
        let class = &decoded.body.predictions[0].classes[0];
        assert_eq!(class.cat, "Person");
        assert!(class.last);
        assert!((class.prob - 0.92).abs() < 1e-9);
        assert!((class.bbox.ymax - 260.25).abs() < 1e-9);
    }

    #[test]
    fn decodes_an_error_response_without_predictions() {
        let decoded: PredictionResponse =
            serde_json::from_str(r#"{"status": {"code": 400, "msg": "service not found"}}"#)
                .unwrap();
        assert_eq!(decoded.status.code, 400);
        assert!(decoded.body.predictions.is_empty());
    }

    #[test]
    fn json_payload_matches_the_wire_contract() {
        let client = client("http://127.0.0.1:1", DetectMode::JsonPath);
        let payload = serde_json::to_value(client.json_payload("upload-door.jpg")).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({
                "service": "detection_600",
                "parameters": {
                    "input": {},
                    "output": {"confidence_threshold": 0.3, "bbox": true},
                    "mllib": {"gpu": false}
                },
                "data": ["/data/upload-door.jpg"]
            })
        );
    }

    #[tokio::test]
    async fn json_mode_posts_the_mounted_path() {
        let (url, stub) = spawn_stub("HTTP/1.1 200 OK", PERSON_RESPONSE);
        let client = client(&url, DetectMode::JsonPath);

        let response = client
            .detect("upload-door.jpg", Path::new("unused.jpg"))
            .await
            .unwrap();
        assert_eq!(response.body.predictions[0].classes[0].cat, "Person");

        let request = stub.join().unwrap();
        assert!(contains(&request, b"POST / HTTP/1.1"));
        assert!(contains(&request, b"\"data\":[\"/data/upload-door.jpg\"]"));
        assert!(contains(&request, b"\"service\":\"detection_600\""));
    }

    #[tokio::test]
    async fn upload_mode_posts_the_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload-door.jpg");
        std::fs::write(&path, b"jpeg-payload").unwrap();

        let (url, stub) = spawn_stub("HTTP/1.1 200 OK", PERSON_RESPONSE);
        let client = client(&url, DetectMode::Upload);
        client.detect("upload-door.jpg", &path).await.unwrap();

        let request = stub.join().unwrap();
        assert!(contains(&request, b"filename=\"upload-door.jpg\""));
        assert!(contains(&request, b"jpeg-payload"));
    }

    #[tokio::test]
    async fn upload_mode_reports_a_missing_image() {
        let client = client("http://127.0.0.1:1", DetectMode::Upload);
        let err = client
            .detect("upload-door.jpg", Path::new("no-such-dir/upload-door.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::Read { .. }));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_request_error() {
        let client = client(&refused_url(), DetectMode::JsonPath);
        let err = client
            .detect("upload-door.jpg", Path::new("unused.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::Request { .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let (url, _stub) = spawn_stub("HTTP/1.1 200 OK", "not json at all");
        let client = client(&url, DetectMode::JsonPath);
        let err = client
            .detect("upload-door.jpg", Path::new("unused.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::Decode(_)));
    }
}
