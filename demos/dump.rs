use dvrts_io::{DecodeConfig, DeriveStreamKey, StreamDescriptor, TransportStreamProcessor, TuringKey};
use std::env;
use std::fs::File;

/// Stands in for the real MAK-to-key schedule, which lives outside this
/// crate: treats the container's recorded nonce as the key directly.
struct IdentityKeyDeriver;

impl DeriveStreamKey for IdentityKeyDeriver {
    fn derive_stream_key(&self, _mak: &str, _stream_id: u8, initial_nonce: &[u8; 16]) -> TuringKey {
        TuringKey(*initial_nonce)
    }
}

/// Parses one `stream_id:stream_type:nonce_hex` triple, e.g. `e0:02:00112233445566778899aabbccddeeff`.
fn parse_stream_arg(arg: &str) -> StreamDescriptor {
    let mut parts = arg.split(':');
    let stream_id = u8::from_str_radix(parts.next().expect("missing stream_id"), 16)
        .expect("stream_id must be hex");
    let stream_type = u8::from_str_radix(parts.next().expect("missing stream_type"), 16)
        .expect("stream_type must be hex");
    let nonce_hex = parts.next().expect("missing nonce");
    assert_eq!(nonce_hex.len(), 32, "nonce must be 16 bytes of hex");
    let mut nonce = [0u8; 16];
    for (i, byte) in nonce.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&nonce_hex[i * 2..i * 2 + 2], 16).expect("nonce must be hex");
    }
    StreamDescriptor::new(stream_id, stream_type, nonce)
}

fn main() {
    pretty_env_logger::init();

    let mut args = env::args().skip(1);
    let input_path = args.next().expect("usage: dump <input> <output> <mak> [stream_id:stream_type:nonce_hex ...]");
    let output_path = args.next().expect("missing output path");
    let mak = args.next().expect("missing mak");
    let streams: Vec<StreamDescriptor> = args.map(|a| parse_stream_arg(&a)).collect();

    let config = DecodeConfig::new(mak, streams);
    let mut processor = TransportStreamProcessor::new(config, IdentityKeyDeriver);

    let source = File::open(&input_path).expect("unable to open input");
    let mut sink = File::create(&output_path).expect("unable to create output");

    let report = processor.process(source, &mut sink).expect("decode failed");
    println!(
        "{}: {} packets in, {} packets out",
        input_path, report.packets_in, report.packets_out
    );
}
