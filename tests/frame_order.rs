use image::{Rgb, RgbImage};
use rand::{Rng, SeedableRng};

use tiltcam::{DecodedImage, DetectionPipeline, FrameBus, FrameSink};

fn jpeg(shade: u8) -> Vec<u8> {
    DecodedImage::from_rgb(RgbImage::from_pixel(24, 16, Rgb([shade, 0, 255 - shade])))
        .encode_jpeg(80)
        .expect("encode jpeg")
}

/// Random chunking, interleaved junk and truncated frames never break ordering or
/// let an undecodable frame through.
#[test]
fn published_sequences_increase_for_any_chunking() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    for _round in 0..20 {
        let mut stream = Vec::new();
        let mut good = 0u64;
        for i in 0..rng.gen_range(1..8u8) {
            let frame = jpeg(i.wrapping_mul(31));
            match rng.gen_range(0..4) {
                0 => stream.extend_from_slice(&frame[..frame.len() / 3]),
                1 => {
                    stream.extend_from_slice(b"\r\n--FRAME\r\nContent-Type: image/jpeg\r\n\r\n");
                    stream.extend_from_slice(&frame);
                    good += 1;
                }
                _ => {
                    stream.extend_from_slice(&frame);
                    good += 1;
                }
            }
        }

        let bus = FrameBus::new();
        let mut sink = FrameSink::new(bus.clone(), DetectionPipeline::passthrough());
        let mut subscriber = bus.subscribe();
        let mut seen = Vec::new();

        let mut offset = 0;
        while offset < stream.len() {
            let len = rng.gen_range(1..=512).min(stream.len() - offset);
            assert_eq!(sink.ingest(&stream[offset..offset + len]), len);
            offset += len;
            if let Some(published) = subscriber.try_next() {
                DecodedImage::decode(published.frame.bytes()).expect("published frame decodes");
                seen.push(published.seq());
            }
        }
        sink.flush();
        if let Some(published) = subscriber.try_next() {
            seen.push(published.seq());
        }

        assert!(seen.windows(2).all(|w| w[0] < w[1]), "{:?}", seen);
        assert_eq!(sink.stats().published, good);
        if good > 0 {
            assert_eq!(bus.latest().expect("latest").seq(), good);
        }
    }
}
