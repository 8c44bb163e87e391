//! Example: structured values -> JSON lines on stdout.
//!
//! Run with `cargo run --example json_pipeline`.

use pipestage::*;
use serde_json::json;

fn main() -> Result<()> {
    let to_json = Transform::with_flush(
        |chunk, _encoding, done| match chunk.to_json() {
            Ok(mut line) => {
                line.push('\n');
                done.ok(line)
            }
            Err(err) => done.fail(err),
        },
        |done| {
            done.push("# end of stream\n")?;
            done.done()
        },
    );
    let lines = std::rc::Rc::new(std::cell::Cell::new(0usize));
    let through = PassThrough::new();
    let seen = lines.clone();
    through.on_data(move |_| seen.set(seen.get() + 1));
    let stdout = IoSink::new(std::io::stdout()).into_writable();

    to_json.on_error(|err| eprintln!("transform failed: {err}"));
    stdout.on_error(|err| eprintln!("stdout failed: {err}"));
    to_json.pipe(through).pipe(stdout);

    for i in 0..3 {
        to_json.write_chunk(json!({ "seq": i, "even": i % 2 == 0 }))?;
    }
    to_json.end()?;
    eprintln!("{} lines written", lines.get());
    Ok(())
}
