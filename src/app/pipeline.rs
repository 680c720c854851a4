use std::sync::Arc;

use super::catalog::Catalog;
use super::state::{ImageSource, Recognition, Session};
use super::templates;
use crate::classifier::{Classification, ConfidenceGate};
use crate::error::PipelineError;
use crate::narration::{Narration, NarrationEngine, NarrationRequest, PlaybackMode};
use crate::normalizer::{ImageNormalizer, NormalizedImage};
use crate::panel::{DetailTopic, Transition};

/// Behaviour switches of the recognition flow.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gate: ConfidenceGate,
    pub language: String,
    pub autoplay_topics: bool,
}

/// Detail panel content for the open topic.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicDetail {
    pub title: String,
    pub text: String,
}

/// Outcome of a topic selection.
#[derive(Debug)]
pub struct TopicView {
    pub transition: Transition,
    /// `None` once the panel is closed
    pub detail: Option<TopicDetail>,
    pub narration: Option<Narration>,
}

/// Runs user actions against the shared catalog and the session state.
pub struct Orchestrator {
    catalog: Arc<Catalog>,
    normalizer: ImageNormalizer,
    narrator: Arc<NarrationEngine>,
    settings: Settings,
    session: Session,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<Catalog>,
        normalizer: ImageNormalizer,
        narrator: Arc<NarrationEngine>,
        settings: Settings,
    ) -> Self {
        Self {
            catalog,
            normalizer,
            narrator,
            settings,
            session: Session::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn narrator(&self) -> &NarrationEngine {
        &self.narrator
    }

    pub fn set_live_capture(&mut self, enabled: bool) {
        log::info!("Live capture {}", if enabled { "enabled" } else { "disabled" });
        self.session.live_capture = enabled;
    }

    /// Recognise one image. Any rejection clears the shown result and stops audio.
    pub async fn submit_image(
        &mut self,
        bytes: Vec<u8>,
        source: ImageSource,
    ) -> Result<Recognition, PipelineError> {
        match self.recognise(bytes, source).await {
            Ok(recognition) => {
                self.narrator.stop_all();
                self.session.panel.reset();
                self.session.current = Some(recognition.clone());
                Ok(recognition)
            }
            Err(e) => Err(self.reject(e)),
        }
    }

    /// Reject the current submission: stop audio and drop the shown result.
    pub fn reject(&mut self, err: PipelineError) -> PipelineError {
        log::warn!("Submission rejected: {err}");
        self.narrator.stop_all();
        self.session.clear_result();
        err
    }

    async fn recognise(&self, bytes: Vec<u8>, source: ImageSource) -> Result<Recognition, PipelineError> {
        if source == ImageSource::Capture && !self.session.live_capture {
            return Err(PipelineError::CaptureDisabled);
        }

        let (image, classification) = self.classify(bytes).await?;
        log::debug!(
            "Top class {} of {} at {:.4}",
            classification.index,
            classification.probabilities.len(),
            classification.confidence
        );
        self.settings.gate.check(&classification)?;

        let record = self.catalog.records.lookup(&classification.label)?.clone();
        Ok(Recognition {
            caption: templates::caption(&classification.label),
            summary: templates::summary(&record),
            display: image.display,
            classification,
            record,
        })
    }

    async fn classify(&self, bytes: Vec<u8>) -> Result<(NormalizedImage, Classification), PipelineError> {
        let catalog = self.catalog.clone();
        let normalizer = self.normalizer;
        tokio::task::spawn_blocking(move || {
            let image = normalizer.normalize_bytes(&bytes)?;
            let classification = catalog.classifier.classify(&image.tensor)?;
            Ok::<_, PipelineError>((image, classification))
        })
        .await
        .map_err(|e| PipelineError::ImageProcessing(format!("classification task panicked: {e}")))?
    }

    /// Synthesize the current summary for the caller's player. Never autoplayed.
    pub async fn play_summary(&self) -> Result<Narration, PipelineError> {
        let current = self.session.current.as_ref().ok_or(PipelineError::NoRecord)?;
        let request = NarrationRequest::new(
            current.summary.as_str(),
            self.settings.language.as_str(),
            PlaybackMode::Manual,
        );
        Ok(self.narrator.narrate(&request).await)
    }

    /// Toggle a detail topic. Audio is stopped first on every transition.
    pub async fn select_topic(&mut self, topic: DetailTopic) -> Result<TopicView, PipelineError> {
        let record = match &self.session.current {
            Some(current) => current.record.clone(),
            None => return Err(PipelineError::NoRecord),
        };

        let transition = self.session.panel.select(topic);
        self.narrator.stop_all();
        log::info!("Panel transition {transition:?}, now showing {:?}", self.session.panel.active());

        let Some(active) = transition.entered() else {
            return Ok(TopicView {
                transition,
                detail: None,
                narration: None,
            });
        };

        let detail = TopicDetail {
            title: templates::topic_title(&record, active),
            text: crate::records::or_not_available(active.field(&record)).to_string(),
        };

        let narration = if self.settings.autoplay_topics {
            let text = templates::topic_narration(&record, active);
            let request = NarrationRequest::new(text, self.settings.language.as_str(), PlaybackMode::Auto);
            Some(self.narrator.narrate(&request).await)
        } else {
            None
        };

        Ok(TopicView {
            transition,
            detail: Some(detail),
            narration,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classifier::tests::FixedModel;
    use crate::classifier::Classifier;
    use crate::config::TensorLayout;
    use crate::narration::tests::{RecordingSink, StubBackend};
    use crate::narration::{BackendKind, TtsBackend};
    use crate::panel::PanelState;
    use crate::records::tests::store;
    use crate::records::NOT_AVAILABLE;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::Ordering;

    pub(crate) struct Harness {
        pub orchestrator: Orchestrator,
        pub sink: Arc<RecordingSink>,
        pub network: Arc<StubBackend>,
        pub offline: Arc<StubBackend>,
    }

    pub(crate) fn harness(probabilities: Vec<f32>, threshold: f32) -> Harness {
        let records = store();
        let labels = records.labels();
        let catalog = Catalog::new(Classifier::new(Box::new(FixedModel(probabilities)), labels), records);

        let network = StubBackend::new(BackendKind::Network, true, false);
        let offline = StubBackend::new(BackendKind::Offline, true, false);
        let sink = Arc::new(RecordingSink::default());
        let backends = vec![
            network.clone() as Arc<dyn TtsBackend>,
            offline.clone() as Arc<dyn TtsBackend>,
        ];
        let narrator = Arc::new(NarrationEngine::new(backends, sink.clone(), true));

        let settings = Settings {
            gate: ConfidenceGate::new(threshold),
            language: "id".into(),
            autoplay_topics: true,
        };
        Harness {
            orchestrator: Orchestrator::new(
                Arc::new(catalog),
                ImageNormalizer::new(8, TensorLayout::Nhwc),
                narrator,
                settings,
            ),
            sink,
            network,
            offline,
        }
    }

    pub(crate) fn png(w: u32, h: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 40, 40])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn stops(h: &Harness) -> usize {
        h.sink.stops.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn recognised_package_shows_confidence_and_summary() {
        // Sorted labels: amoxicillin_500, paracetamol_500
        let mut h = harness(vec![0.13, 0.87], 0.0);
        let result = h.orchestrator.submit_image(png(40, 30), ImageSource::Upload).await.unwrap();

        assert_eq!(result.record.label, "paracetamol_500");
        assert_eq!(result.record.name, "Paracetamol 500mg");
        assert_eq!(result.confidence_percent(), "87.00%");
        assert_eq!(result.caption, "Hasil Deteksi: paracetamol_500");
        assert_eq!(result.summary, templates::summary(&result.record));
        assert_eq!(result.display.dimensions(), (8, 8));
        assert_eq!(h.orchestrator.session().panel, PanelState::NoneActive);
        // Summary is never autoplayed
        assert!(h.sink.played.lock().unwrap().is_empty());
        assert_eq!(h.network.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn low_confidence_is_rejected_and_audio_stopped() {
        let mut h = harness(vec![0.10, 0.05], 0.5);
        let err = h.orchestrator.submit_image(png(10, 10), ImageSource::Upload).await.unwrap_err();

        assert!(matches!(err, PipelineError::LowConfidence { .. }));
        assert!(err.to_string().contains("10.00%"));
        assert!(h.orchestrator.session().current.is_none());
        assert_eq!(stops(&h), 1);
    }

    #[tokio::test]
    async fn rejection_replaces_a_previous_result() {
        let mut h = harness(vec![0.13, 0.87], 0.0);
        h.orchestrator.submit_image(png(10, 10), ImageSource::Upload).await.unwrap();
        h.orchestrator.select_topic(DetailTopic::Storage).await.unwrap();

        let err = h.orchestrator.submit_image(b"not an image".to_vec(), ImageSource::Upload).await;
        assert!(matches!(err, Err(PipelineError::ImageProcessing(_))));
        assert!(h.orchestrator.session().current.is_none());
        assert_eq!(h.orchestrator.session().panel, PanelState::NoneActive);
    }

    #[tokio::test]
    async fn label_without_record_is_reported() {
        let records = store();
        let classifier = Classifier::new(
            Box::new(FixedModel(vec![0.9, 0.1])),
            vec!["ibuprofen_400".into(), "paracetamol_500".into()],
        );
        let mut h = harness(vec![], 0.0);
        h.orchestrator.catalog = Arc::new(Catalog::new(classifier, records));

        let err = h.orchestrator.submit_image(png(10, 10), ImageSource::Upload).await.unwrap_err();
        assert!(matches!(err, PipelineError::RecordNotFound(ref e) if e.0 == "ibuprofen_400"));
        assert_eq!(stops(&h), 1);
    }

    #[tokio::test]
    async fn capture_requires_camera() {
        let mut h = harness(vec![0.13, 0.87], 0.0);
        let err = h.orchestrator.submit_image(png(10, 10), ImageSource::Capture).await.unwrap_err();
        assert!(matches!(err, PipelineError::CaptureDisabled));

        h.orchestrator.set_live_capture(true);
        assert!(h.orchestrator.submit_image(png(10, 10), ImageSource::Capture).await.is_ok());
    }

    #[tokio::test]
    async fn side_effects_toggle_closes_without_audio() {
        let mut h = harness(vec![0.13, 0.87], 0.0);
        h.orchestrator.submit_image(png(10, 10), ImageSource::Upload).await.unwrap();
        let stops_before = stops(&h);

        let opened = h.orchestrator.select_topic(DetailTopic::SideEffects).await.unwrap();
        assert_eq!(opened.transition, Transition::Opened(DetailTopic::SideEffects));
        let detail = opened.detail.unwrap();
        assert_eq!(detail.title, "Efek Samping Paracetamol 500mg:");
        assert_eq!(detail.text, "Mual ringan");
        assert_eq!(opened.narration.unwrap().audio.unwrap().backend, BackendKind::Offline);
        assert_eq!(h.sink.played.lock().unwrap().len(), 1);

        let closed = h.orchestrator.select_topic(DetailTopic::SideEffects).await.unwrap();
        assert_eq!(closed.transition, Transition::Closed(DetailTopic::SideEffects));
        assert!(closed.detail.is_none());
        assert!(closed.narration.is_none());
        assert_eq!(h.orchestrator.session().panel, PanelState::NoneActive);
        assert_eq!(stops(&h), stops_before + 2);
        assert_eq!(h.sink.played.lock().unwrap().len(), 1);
        assert_eq!(h.offline.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn switching_topics_keeps_one_open() {
        let mut h = harness(vec![0.13, 0.87], 0.0);
        h.orchestrator.submit_image(png(10, 10), ImageSource::Upload).await.unwrap();
        h.orchestrator.select_topic(DetailTopic::SideEffects).await.unwrap();

        let view = h.orchestrator.select_topic(DetailTopic::FoodRestrictions).await.unwrap();
        assert_eq!(
            view.transition,
            Transition::Switched {
                from: DetailTopic::SideEffects,
                to: DetailTopic::FoodRestrictions
            }
        );
        assert_eq!(view.detail.unwrap().text, NOT_AVAILABLE);
        assert_eq!(
            h.orchestrator.session().panel,
            PanelState::ActiveTopic(DetailTopic::FoodRestrictions)
        );
    }

    #[tokio::test]
    async fn new_submission_closes_open_topic() {
        let mut h = harness(vec![0.13, 0.87], 0.0);
        h.orchestrator.submit_image(png(10, 10), ImageSource::Upload).await.unwrap();
        h.orchestrator.select_topic(DetailTopic::MissedDose).await.unwrap();
        h.orchestrator.submit_image(png(12, 10), ImageSource::Upload).await.unwrap();
        assert_eq!(h.orchestrator.session().panel, PanelState::NoneActive);
    }

    #[tokio::test]
    async fn topics_and_playback_need_a_record() {
        let mut h = harness(vec![0.13, 0.87], 0.0);
        assert!(matches!(
            h.orchestrator.select_topic(DetailTopic::Storage).await,
            Err(PipelineError::NoRecord)
        ));
        assert!(matches!(h.orchestrator.play_summary().await, Err(PipelineError::NoRecord)));
        assert_eq!(h.orchestrator.session().panel, PanelState::NoneActive);
        assert_eq!(stops(&h), 0);
    }

    #[tokio::test]
    async fn manual_summary_uses_network_and_is_returned() {
        let mut h = harness(vec![0.13, 0.87], 0.0);
        h.orchestrator.submit_image(png(10, 10), ImageSource::Upload).await.unwrap();

        let narration = h.orchestrator.play_summary().await.unwrap();
        let audio = narration.audio.unwrap();
        assert_eq!(audio.backend, BackendKind::Network);
        assert!(std::str::from_utf8(&audio.bytes).unwrap().starts_with("Obat yang terdeteksi adalah"));
        assert!(h.sink.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn autoplay_can_be_disabled() {
        let mut h = harness(vec![0.13, 0.87], 0.0);
        h.orchestrator.settings.autoplay_topics = false;
        h.orchestrator.submit_image(png(10, 10), ImageSource::Upload).await.unwrap();

        let view = h.orchestrator.select_topic(DetailTopic::Storage).await.unwrap();
        assert!(view.detail.is_some());
        assert!(view.narration.is_none());
        assert_eq!(h.offline.calls.load(Ordering::SeqCst), 0);
    }
}
