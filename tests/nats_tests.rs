use sentinel_recorder::audio::LiveBroadcaster;
use sentinel_recorder::nats::AudioFrameMessage;

#[test]
fn test_audio_frame_serialization() {
    let msg = AudioFrameMessage {
        device: "sentinel-01".to_string(),
        sequence: 0,
        pcm: String::new(),
        sample_rate: 20000,
        channels: 1,
        timestamp: "2025-10-27T14:30:00Z".to_string(),
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"device\":\"sentinel-01\""));
    assert!(json.contains("\"sample_rate\":20000"));
    assert!(json.contains("\"sequence\":0"));

    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, msg);
}

#[test]
fn test_live_chunk_becomes_frame() {
    let broadcaster = LiveBroadcaster::default();
    let mut subscription = broadcaster.subscribe(4).unwrap();

    let chunk = [0i16, 512, -512, i16::MIN];
    assert_eq!(broadcaster.broadcast(&chunk), 1);

    let payload = subscription.rx.try_recv().unwrap();
    let msg = AudioFrameMessage::new("sentinel-01", 3, &payload, 20000);

    assert_eq!(msg.sequence, 3);
    assert_eq!(msg.decode_pcm().unwrap(), chunk.to_vec());
}

#[test]
fn test_frame_with_odd_byte_count_drops_trailing_byte() {
    let msg = AudioFrameMessage::new("sentinel-01", 0, &[0x01, 0x00, 0xff], 20000);
    assert_eq!(msg.decode_pcm().unwrap(), vec![1]);
}
