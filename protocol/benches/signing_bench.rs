// Signing & recovery benchmarks for Ghost Agent.
//
// Covers secp256k1 keypair generation, intent-hash signing, signer recovery,
// and canonical payload hashing.

use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;

use ghost_protocol::crypto::keys::AgentKeypair;
use ghost_protocol::crypto::signatures::{recover, sign_intent_hash};
use ghost_protocol::intent::IntentPayload;

fn sample_payload() -> IntentPayload {
    IntentPayload::new(250_000_000_000_000_000, "US", 1_760_000_000)
        .with_metadata("channel", json!("mobile"))
        .with_metadata("device", json!({ "os": "ios", "build": 42 }))
}

fn bench_keypair_generation(c: &mut Criterion) {
    c.bench_function("secp256k1/keypair_generate", |b| {
        b.iter(AgentKeypair::generate);
    });
}

fn bench_sign_intent_hash(c: &mut Criterion) {
    let keypair = AgentKeypair::generate();
    let hash = *sample_payload().intent_hash().unwrap().as_bytes();

    c.bench_function("secp256k1/sign_intent_hash", |b| {
        b.iter(|| sign_intent_hash(&keypair, &hash));
    });
}

fn bench_recover(c: &mut Criterion) {
    let keypair = AgentKeypair::generate();
    let hash = *sample_payload().intent_hash().unwrap().as_bytes();
    let signature = sign_intent_hash(&keypair, &hash);

    c.bench_function("secp256k1/recover", |b| {
        b.iter(|| recover(&hash, signature.as_bytes()));
    });
}

fn bench_payload_hash(c: &mut Criterion) {
    let payload = sample_payload();

    c.bench_function("keccak256/intent_payload_hash", |b| {
        b.iter(|| payload.intent_hash());
    });
}

criterion_group!(
    benches,
    bench_keypair_generation,
    bench_sign_intent_hash,
    bench_recover,
    bench_payload_hash,
);
criterion_main!(benches);
