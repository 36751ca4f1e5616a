#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use std::io::Cursor;

    use crate::api::{ApiError, MockSpeechApi};
    use crate::audio::{AudioPayload, MIME_MPEG, MIME_WAV};
    use crate::recording::{RecordingError, RecordingSession, RecordingState};
    use crate::tests::test_helpers::FakeMicrophone;

    fn sample_count(payload: &AudioPayload) -> u32 {
        let reader = hound::WavReader::new(Cursor::new(payload.bytes().to_vec())).unwrap();
        reader.duration()
    }

    #[test]
    fn test_start_without_voice_stays_idle() {
        let mut session = RecordingSession::new();
        let mic = FakeMicrophone::pcm(vec![vec![1, 0]]);

        assert!(matches!(session.start(None, &mic), Err(RecordingError::NoVoiceSelected)));
        assert!(matches!(session.start(Some("  "), &mic), Err(RecordingError::NoVoiceSelected)));
        assert_eq!(session.state(), RecordingState::Idle);
    }

    #[test]
    fn test_denied_microphone_stays_idle() {
        let mut session = RecordingSession::new();
        let err = session.start(Some("aria-01"), &FakeMicrophone::denied()).unwrap_err();

        assert!(matches!(err, RecordingError::MicrophoneDenied(_)));
        assert_eq!(session.state(), RecordingState::Idle);
    }

    #[test]
    fn test_stop_while_idle_is_noop() {
        let mut session = RecordingSession::new();
        assert!(session.stop().unwrap().is_none());
        assert_eq!(session.state(), RecordingState::Idle);
    }

    #[test]
    fn test_chunks_are_assembled_in_order() {
        let mut session = RecordingSession::new();
        // Two samples from the device, one pushed by the host
        let mic = FakeMicrophone::pcm(vec![vec![1, 0, 2, 0]]);
        session.start(Some("aria-01"), &mic).unwrap();
        assert_eq!(session.state(), RecordingState::Recording);

        assert!(session.push_chunk(Bytes::from_static(&[3, 0])));
        assert!(!session.push_chunk(Bytes::new()));

        let payload = session.stop().unwrap().cloned().unwrap();
        assert_eq!(session.state(), RecordingState::Processing);
        assert_eq!(payload.mime(), MIME_WAV);
        assert_eq!(sample_count(&payload), 3);

        let mut reader = hound::WavReader::new(Cursor::new(payload.bytes().to_vec())).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[2], 3);
    }

    #[test]
    fn test_chunks_after_stop_are_ignored() {
        let mut session = RecordingSession::new();
        session
            .start(Some("aria-01"), &FakeMicrophone::pcm(vec![vec![1, 0]]))
            .unwrap();
        session.stop().unwrap();

        assert!(!session.push_chunk(Bytes::from_static(&[9, 9])));
        assert_eq!(session.chunk_count(), 1);
        // A second stop does nothing
        assert!(session.stop().unwrap().is_none());
    }

    #[test]
    fn test_empty_take_fails() {
        let mut session = RecordingSession::new();
        session
            .start(Some("aria-01"), &FakeMicrophone::pcm(vec![]))
            .unwrap();

        assert!(matches!(session.stop(), Err(RecordingError::Assembly(_))));
        assert_eq!(session.state(), RecordingState::Failed);
    }

    #[tokio::test]
    async fn test_submit_uploads_once_and_completes() {
        let mut api = MockSpeechApi::new();
        api.expect_convert_recording()
            .withf(|request| {
                request.voice_id == "aria-01"
                    && request.model_id == "eleven_multilingual_v2"
                    && request.audio.mime() == MIME_WAV
            })
            .times(1)
            .returning(|_| Ok(AudioPayload::new(&b"converted"[..], MIME_MPEG)));

        let mut session = RecordingSession::new();
        session
            .start(Some("aria-01"), &FakeMicrophone::pcm(vec![vec![1, 0, 2, 0]]))
            .unwrap();

        let converted = session.submit(&api, "eleven_multilingual_v2").await.unwrap();
        assert_eq!(converted.bytes().as_ref(), b"converted");
        assert_eq!(session.state(), RecordingState::Complete);
        assert_eq!(session.result(), Some(&converted));
        assert!(session.payload().is_some());
    }

    #[tokio::test]
    async fn test_failed_submit_is_terminal() {
        let mut api = MockSpeechApi::new();
        api.expect_convert_recording()
            .times(1)
            .returning(|_| Err(ApiError::Network("connection reset".to_string())));

        let mut session = RecordingSession::new();
        let mic = FakeMicrophone::pcm(vec![vec![1, 0]]);
        session.start(Some("aria-01"), &mic).unwrap();

        let err = session.submit(&api, "eleven_multilingual_v2").await.unwrap_err();
        assert!(matches!(err, RecordingError::Processing(ApiError::Network(_))));
        assert_eq!(session.state(), RecordingState::Failed);

        assert!(matches!(
            session.start(Some("aria-01"), &mic),
            Err(RecordingError::AlreadyFinished(RecordingState::Failed))
        ));
        assert!(matches!(
            session.submit(&api, "eleven_multilingual_v2").await,
            Err(RecordingError::AlreadyFinished(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_before_start_is_rejected() {
        let api = MockSpeechApi::new();
        let mut session = RecordingSession::new();

        assert!(matches!(
            session.submit(&api, "eleven_multilingual_v2").await,
            Err(RecordingError::InvalidTransition {
                from: RecordingState::Idle,
                ..
            })
        ));
        assert_eq!(session.state(), RecordingState::Idle);
    }
}
