use criterion::{Criterion, criterion_group, criterion_main};
use gateway::signature::{payment_message, sign_hex, verify_hex};
use std::hint::black_box;

const SECRET: &[u8] = b"rzp_test_secret_0123456789";

fn bench_sign_payment(c: &mut Criterion) {
    let message = payment_message("order_Nq1x2y3z4a5b6c", "pay_Nq1x2y3z4a5b6d");

    c.bench_function("signature/sign_payment", |b| {
        b.iter(|| sign_hex(black_box(SECRET), black_box(message.as_bytes())));
    });
}

fn bench_verify_payment(c: &mut Criterion) {
    let message = payment_message("order_Nq1x2y3z4a5b6c", "pay_Nq1x2y3z4a5b6d");
    let signature = sign_hex(SECRET, message.as_bytes());

    c.bench_function("signature/verify_payment", |b| {
        b.iter(|| {
            verify_hex(
                black_box(SECRET),
                black_box(message.as_bytes()),
                black_box(&signature),
            )
        });
    });
}

fn bench_verify_webhook_body(c: &mut Criterion) {
    let body = serde_json::json!({
        "entity": "event",
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_Nq1x2y3z4a5b6d",
                    "order_id": "order_Nq1x2y3z4a5b6c",
                    "amount": 102000,
                    "currency": "INR",
                    "status": "captured",
                    "method": "upi"
                }
            }
        }
    })
    .to_string();
    let signature = sign_hex(SECRET, body.as_bytes());

    c.bench_function("signature/verify_webhook_body", |b| {
        b.iter(|| verify_hex(black_box(SECRET), black_box(body.as_bytes()), black_box(&signature)));
    });
}

criterion_group!(
    benches,
    bench_sign_payment,
    bench_verify_payment,
    bench_verify_webhook_body
);
criterion_main!(benches);
