//! Observation fixtures in the on-disk JSON format read by the indexer.

use serde_json::{json, Value};

/// Builder for one observation file.
#[derive(Debug, Clone)]
pub struct ObservationFixture {
    id: String,
    procedure: String,
    observed_property: String,
    feature_of_interest: String,
    location: Option<(f64, f64)>,
    sampling_time: Option<Value>,
    result: Value,
}

impl ObservationFixture {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            procedure: "urn:ogc:object:sensor:test:1".to_string(),
            observed_property: "temperature".to_string(),
            feature_of_interest: "station-1".to_string(),
            location: None,
            sampling_time: None,
            result: json!("n/a"),
        }
    }

    pub fn procedure(mut self, procedure: &str) -> Self {
        self.procedure = procedure.to_string();
        self
    }

    pub fn observed_property(mut self, property: &str) -> Self {
        self.observed_property = property.to_string();
        self
    }

    pub fn feature_of_interest(mut self, id: &str) -> Self {
        self.feature_of_interest = id.to_string();
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.location = Some((x, y));
        self
    }

    /// Single-point sampling time (ISO 8601).
    pub fn instant(mut self, at: &str) -> Self {
        self.sampling_time = Some(json!({ "instant": at }));
        self
    }

    /// Interval sampling time (ISO 8601 bounds).
    pub fn period(mut self, begin: &str, end: &str) -> Self {
        self.sampling_time = Some(json!({ "period": { "begin": begin, "end": end } }));
        self
    }

    /// Give the observation a measured value, making it a measurement.
    pub fn measure(mut self, value: f64, uom: &str) -> Self {
        self.result = json!({ "value": value, "uom": uom });
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn to_json(&self) -> Value {
        let mut feature = json!({ "id": self.feature_of_interest });
        if let Some((x, y)) = self.location {
            feature["location"] = json!({ "point": [x, y] });
        }
        let mut value = json!({
            "id": self.id,
            "procedure": self.procedure,
            "observed_property": self.observed_property,
            "feature_of_interest": feature,
            "result": self.result,
        });
        if let Some(time) = &self.sampling_time {
            value["sampling_time"] = time.clone();
        }
        value
    }
}

/// JSON that parses but is not an observation.
pub fn not_an_observation() -> Value {
    json!({ "type": "FeatureCollection", "features": [] })
}
