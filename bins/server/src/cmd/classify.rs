use pipeline::{DelayTable, classify};

use crate::config::ClassifyArgs;
use crate::error::ServerError;

pub fn run(args: ClassifyArgs) -> Result<(), ServerError> {
    let payload = args.payload.join(" ");
    let category = classify(&payload);
    let range = DelayTable::default().range(category);
    if range.min_ms == range.max_ms {
        println!("{category} ({}ms)", range.min_ms);
    } else {
        println!("{category} ({}-{}ms)", range.min_ms, range.max_ms);
    }
    Ok(())
}
