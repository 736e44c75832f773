use futures::future::join_all;
use grow_mask::{
    ChannelConfig, FilterChannel, InboundMessage, MaskError, Pixel, Raster, RequestId, filter,
};

fn channel(workers: usize) -> FilterChannel {
    let channel = FilterChannel::new(ChannelConfig::default().with_workers(workers));
    channel.install();
    channel
}

/// Black raster with a single green pixel at `(x, y)`.
fn dot(width: u32, height: u32, x: u32, y: u32) -> Raster {
    let mut raster = Raster::filled(width, height, Pixel::rgb(0, 0, 0)).unwrap();
    raster.set_pixel(x, y, Pixel::rgb(0, 50, 0));
    raster
}

#[tokio::test]
async fn round_trip_keeps_id_and_dimensions() {
    let channel = channel(2);
    let mut producer = channel.producer();

    let request_id = producer.post(dot(31, 17, 3, 3)).unwrap();
    let response = producer.recv().await.unwrap();

    assert_eq!(response.request_id, request_id);
    let raster = response.into_raster().unwrap();
    assert_eq!(raster.dimensions(), (31, 17));
    assert_eq!(raster, filter(dot(31, 17, 3, 3)).unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_receive_their_own_rasters() {
    let channel = channel(4);

    let inputs: Vec<Raster> = (0..8u32)
        .map(|i| dot(20 + i, 20, i * 2, 19 - i))
        .collect();

    let runs = inputs.iter().cloned().map(|input| {
        let mut producer = channel.producer();
        async move {
            let expected = filter(input.clone()).unwrap();
            let received = producer.filter(input).await.unwrap();
            (expected, received)
        }
    });

    for (expected, received) in join_all(runs).await {
        assert_eq!(received, expected);
    }
}

#[tokio::test]
async fn responses_arriving_out_of_order_are_parked() {
    let channel = channel(3);
    let mut producer = channel.producer();

    let small = producer.post(dot(4, 4, 1, 1)).unwrap();
    let large = producer.post(dot(400, 300, 200, 150)).unwrap();
    let medium = producer.post(dot(40, 30, 20, 15)).unwrap();

    let large_out = producer.wait_for(large).await.unwrap();
    let small_out = producer.wait_for(small).await.unwrap();
    let medium_out = producer.wait_for(medium).await.unwrap();

    assert_eq!(large_out.dimensions(), (400, 300));
    assert_eq!(small_out.dimensions(), (4, 4));
    assert_eq!(medium_out.dimensions(), (40, 30));
}

#[tokio::test]
async fn malformed_raster_fails_only_its_own_request() {
    let channel = channel(1);
    let mut producer = channel.producer();

    let json = r#"{
        "type": "IMAGE_DATA",
        "requestId": 100,
        "imageData": { "width": 3, "height": 3, "data": [0, 0, 0, 0] }
    }"#;
    let message: InboundMessage = serde_json::from_str(json).unwrap();
    producer.post_message(message).unwrap();

    assert!(matches!(
        producer.wait_for(RequestId(100)).await,
        Err(MaskError::ShapeMismatch { expected: 36, actual: 4, .. })
    ));
    assert!(producer.filter(dot(9, 9, 4, 4)).await.is_ok());
}

#[tokio::test]
async fn dropped_producer_does_not_disturb_others() {
    let channel = channel(1);

    let mut gone = channel.producer();
    gone.post(dot(64, 64, 10, 10)).unwrap();
    drop(gone);

    let mut producer = channel.producer();
    let out = producer.filter(dot(12, 12, 6, 6)).await.unwrap();
    assert_eq!(out.alpha(6, 6), Some(255));
}

#[tokio::test]
async fn producers_follow_reinstallation() {
    let channel = channel(2);
    let mut producer = channel.producer();
    assert!(producer.filter(dot(8, 8, 0, 0)).await.is_ok());

    channel.install();
    let out = producer.filter(dot(8, 8, 7, 7)).await.unwrap();
    assert_eq!(out.alpha(3, 3), Some(255));
    assert_eq!(out.alpha(2, 2), Some(100));
}

#[tokio::test]
async fn requests_in_flight_during_reinstall_are_answered() {
    let channel = channel(1);
    let mut producer = channel.producer();

    let ids: Vec<RequestId> = (0..6)
        .map(|_| producer.post(dot(256, 256, 128, 128)).unwrap())
        .collect();
    channel.install();

    for request_id in ids {
        match producer.wait_for(request_id).await {
            Ok(raster) => assert_eq!(raster.alpha(128, 128), Some(255)),
            Err(err) => assert_eq!(err, MaskError::Cancelled(request_id)),
        }
    }
}

#[tokio::test]
async fn queued_requests_of_a_superseded_generation_are_cancelled() {
    let channel = FilterChannel::new(ChannelConfig {
        skip_waiting: false,
        ..ChannelConfig::default().with_workers(1)
    });
    channel.install();
    assert_eq!(channel.activate(), Ok(1));
    let mut producer = channel.producer();

    // The single-threaded test runtime polls no worker until the first await,
    // so every request is still queued in generation 1 when 2 takes over.
    let ids: Vec<RequestId> = (0..4)
        .map(|_| producer.post(dot(64, 64, 32, 32)).unwrap())
        .collect();
    assert_eq!(channel.install(), 2);
    assert_eq!(channel.activate(), Ok(2));

    let mut cancelled = 0;
    for request_id in ids {
        if producer.wait_for(request_id).await == Err(MaskError::Cancelled(request_id)) {
            cancelled += 1;
        }
    }
    assert_eq!(cancelled, 4);
    assert!(producer.filter(dot(8, 8, 4, 4)).await.is_ok());
}
