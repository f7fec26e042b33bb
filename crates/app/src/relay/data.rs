use chrono::{DateTime, Local};
use serde::Serialize;

pub(crate) const DETECTION_QUEUE_CAPACITY: usize = 5;
pub(crate) const RECENT_DETECTIONS_LIMIT: usize = 10;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A stored upload that contained a subject of interest.
#[derive(Clone, Debug)]
pub(crate) struct DetectionRecord {
    pub(crate) image: String,
    pub(crate) time: DateTime<Local>,
}

/// One row of the `/detection` response.
#[derive(Debug, Serialize)]
pub(crate) struct DetectionView {
    #[serde(rename = "imageUrl")]
    pub(crate) image_url: String,
    pub(crate) time: String,
    pub(crate) weather: String,
}

impl DetectionView {
    pub(crate) fn new(record: &DetectionRecord, weather: &str) -> Self {
        Self {
            image_url: record.image.clone(),
            time: record.time.format(TIME_FORMAT).to_string(),
            weather: weather.to_string(),
        }
    }
}
