use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chat_relay::protocol::decode_frame;
use chat_relay::relay::synthesize_frames;
use chat_relay::stream::FrameBuffer;

fn openai_sse_body(frames: usize) -> Vec<u8> {
    let mut body = Vec::with_capacity(frames * 64);
    for idx in 0..frames {
        body.extend_from_slice(
            format!("data: {{\"choices\":[{{\"index\":0,\"message\":{{\"content\":\"tok{idx} \"}}}}]}}\n\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(b"data: {\"choices\":[{\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n");
    body
}

fn ndjson_body(frames: usize) -> Vec<u8> {
    let mut body = Vec::with_capacity(frames * 64);
    for idx in 0..frames {
        body.extend_from_slice(
            format!("{{\"message\":{{\"role\":\"assistant\",\"content\":\"tok{idx} \"}},\"done\":false}}\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(b"{\"done\":true}\n");
    body
}

fn decode_all(body: &[u8], chunk_size: usize) -> usize {
    let mut buffer = FrameBuffer::new();
    let mut content = String::new();
    let mut frames = Vec::new();
    for chunk in body.chunks(chunk_size) {
        buffer.push_into(chunk, &mut frames);
        for frame in frames.drain(..) {
            let decoded = decode_frame(&frame);
            content.push_str(&decoded.delta);
            if decoded.terminal {
                return content.len();
            }
        }
    }
    content.len()
}

fn bench_frame_decoding(c: &mut Criterion) {
    let sse = openai_sse_body(256);
    let ndjson = ndjson_body(256);

    c.bench_function("decode_openai_sse_256_frames_chunk_64", |b| {
        b.iter(|| decode_all(black_box(&sse), 64));
    });
    c.bench_function("decode_openai_sse_256_frames_chunk_4k", |b| {
        b.iter(|| decode_all(black_box(&sse), 4096));
    });
    c.bench_function("decode_ndjson_256_frames_chunk_64", |b| {
        b.iter(|| decode_all(black_box(&ndjson), 64));
    });
    c.bench_function("decode_raw_text_fallback", |b| {
        b.iter(|| decode_frame(black_box("plain text token, not json")));
    });
    c.bench_function("decode_done_sentinel", |b| {
        b.iter(|| decode_frame(black_box("[DONE]")));
    });
}

fn bench_synthesize(c: &mut Criterion) {
    let compact = br#"{"choices":[{"index":0,"message":{"role":"assistant","content":"ok"},"finish_reason":"stop"}]}"#;
    let pretty = b"{\n  \"choices\": [\n    {\"message\": {\"content\": \"ok\"}}\n  ]\n}\n";

    c.bench_function("synthesize_compact_json", |b| {
        b.iter(|| synthesize_frames(black_box(compact)));
    });
    c.bench_function("synthesize_pretty_json", |b| {
        b.iter(|| synthesize_frames(black_box(pretty)));
    });
}

criterion_group!(benches, bench_frame_decoding, bench_synthesize);
criterion_main!(benches);
