use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub operation: String,
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResponseLabels {
    pub allowed: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PatchLabels {
    pub target: &'static str,
}

pub struct InjectorMetrics {
    pub admission_requests_total: Family<RequestLabels, Counter>,
    pub admission_responses_total: Family<ResponseLabels, Counter>,
    pub patch_operations_total: Family<PatchLabels, Counter>,
    pub admission_request_duration_seconds: Histogram,
}

const DURATION_BUCKETS: [f64; 12] = [
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
];

impl InjectorMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let admission_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "injector_admission_requests",
            "Total number of decoded admission requests",
            admission_requests_total.clone(),
        );

        let admission_responses_total = Family::<ResponseLabels, Counter>::default();
        registry.register(
            "injector_admission_responses",
            "Total number of admission responses sent",
            admission_responses_total.clone(),
        );

        let patch_operations_total = Family::<PatchLabels, Counter>::default();
        registry.register(
            "injector_patch_operations",
            "Total number of JSON patch operations emitted, by target field",
            patch_operations_total.clone(),
        );

        let admission_request_duration_seconds = Histogram::new(DURATION_BUCKETS.iter().copied());
        registry.register(
            "injector_admission_request_duration_seconds",
            "Duration of admission request processing in seconds",
            admission_request_duration_seconds.clone(),
        );

        Self {
            admission_requests_total,
            admission_responses_total,
            patch_operations_total,
            admission_request_duration_seconds,
        }
    }

    pub fn record_response(&self, allowed: bool) {
        self.admission_responses_total
            .get_or_create(&ResponseLabels {
                allowed: if allowed { "true" } else { "false" },
            })
            .inc();
    }
}
