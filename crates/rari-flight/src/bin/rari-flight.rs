use bytes::Bytes;
use clap::{Arg, Command};
use rari_flight::codec::escape::{TUPLE_MARKER, WireString, parse_string};
use rari_flight::codec::{Row, RowPayload};
use rari_flight::{
    Component, DecodeOptions, FlightConfig, FlightError, Rejection, Value, decode, render_to_string,
};
use serde_json::Value as JsonValue;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let file_arg = || {
        Arg::new("file")
            .value_name("FILE")
            .help("Captured flight stream")
            .required(true)
            .value_parser(clap::value_parser!(PathBuf))
    };

    let matches = Command::new("rari-flight")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect and render captured flight streams")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(Command::new("inspect").about("List the rows of a stream").arg(file_arg()))
        .subcommand(
            Command::new("render")
                .about("Decode a stream and print the rendered HTML")
                .arg(file_arg()),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML file with codec settings")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Reduce log output")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .get_matches();

    init_logging(&matches)?;

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => FlightConfig::load(path)?,
        None => FlightConfig::default(),
    };

    let result = match matches.subcommand() {
        Some(("inspect", sub_matches)) => inspect(required_path(sub_matches)?, &config).await,
        Some(("render", sub_matches)) => render(required_path(sub_matches)?, config).await,
        _ => Err(FlightError::configuration("Unknown subcommand")),
    };

    result.map_err(|e| {
        error!("{}", e);
        e.into()
    })
}

fn required_path(matches: &clap::ArgMatches) -> Result<&PathBuf, FlightError> {
    matches
        .get_one::<PathBuf>("file")
        .ok_or_else(|| FlightError::configuration("FILE argument is required"))
}

fn init_logging(matches: &clap::ArgMatches) -> Result<(), FlightError> {
    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("rari_flight={default_level}")))
        .map_err(|e| FlightError::configuration(format!("Failed to create log filter: {e}")))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(verbose)
                .with_line_number(verbose)
                .compact(),
        )
        .init();

    Ok(())
}

async fn inspect(path: &Path, config: &FlightConfig) -> Result<(), FlightError> {
    let source = tokio::fs::read_to_string(path).await?;
    let mut out = std::io::stdout().lock();
    inspect_rows(&source, config, &mut out)
}

/// Lists each row of a captured stream. Rows over `max_row_bytes` fail the
/// same way they fail a decode.
fn inspect_rows(
    source: &str,
    config: &FlightConfig,
    out: &mut impl Write,
) -> Result<(), FlightError> {
    for line in source.split('\n') {
        if line.len() > config.max_row_bytes {
            return Err(FlightError::row_too_large(line.len(), config.max_row_bytes));
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        let row = Row::parse(line)?;
        let summary = match &row.payload {
            RowPayload::Model(json) => {
                let mut tags = Vec::new();
                let mut refs = Vec::new();
                collect_references(json, &mut tags, &mut refs);
                format!("model tags=[{}] refs=[{}]", tags.join(","), refs.join(","))
            }
            RowPayload::Error(rejection) => format!("error {rejection:?}"),
        };
        writeln!(out, "{:>4}  {}", row.id, summary)?;
    }
    Ok(())
}

fn collect_references(json: &JsonValue, tags: &mut Vec<String>, refs: &mut Vec<String>) {
    match json {
        JsonValue::String(s) => {
            if let Some(WireString::Deferred(id)) = parse_string(s) {
                refs.push(format!("@{id}"));
            }
        }
        JsonValue::Array(items) => {
            if let [JsonValue::String(marker), JsonValue::String(tag), ..] = items.as_slice()
                && marker == TUPLE_MARKER
            {
                tags.push(tag.clone());
            }
            for item in items {
                collect_references(item, tags, refs);
            }
        }
        JsonValue::Object(map) => {
            for item in map.values() {
                collect_references(item, tags, refs);
            }
        }
        _ => {}
    }
}

async fn render(path: &Path, config: FlightConfig) -> Result<(), FlightError> {
    let contents = Bytes::from(tokio::fs::read(path).await?);
    let stream = futures::stream::iter([Ok::<Bytes, FlightError>(contents)]);

    let options = DecodeOptions::new().with_config(config).with_load_client_reference(
        |metadata: Vec<Value>| async move {
            debug!("Substituting placeholder for client reference {:?}", metadata);
            Ok::<_, Rejection>(Component::new("ClientPlaceholder", |_| Ok(Value::Null)))
        },
    );

    let decoded = decode(stream, options).await?;
    let html = render_to_string(&decoded.value).await?;

    if let Err(e) = decoded.done.await {
        warn!("Stream did not complete cleanly: {}", e);
    }

    let mut out = std::io::stdout().lock();
    writeln!(out, "{html}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(source: &str, config: &FlightConfig) -> Result<String, FlightError> {
        let mut out = Vec::new();
        inspect_rows(source, config, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_inspect_lists_tags_and_references() {
        let source = "0:[\"$P\",\"j\",\"div\",null,{\"children\":\"$@1\"}]\n1:E{\"message\":\"boom\"}\n";
        let listing = listing(source, &FlightConfig::default()).unwrap();
        let lines: Vec<&str> = listing.lines().collect();

        assert_eq!(lines[0], "   0  model tags=[j] refs=[@1]");
        assert!(lines[1].starts_with("   1  error"));
        assert!(lines[1].contains("boom"));
    }

    #[test]
    fn test_inspect_rejects_rows_over_the_limit() {
        let config = FlightConfig { max_row_bytes: 8, ..Default::default() };
        let err = listing("0:\"0123456789\"\n", &config).unwrap_err();
        assert_eq!(err, FlightError::row_too_large(14, 8));
    }

    #[test]
    fn test_inspect_and_decode_agree_on_the_limit() {
        let config = FlightConfig { max_row_bytes: 8, ..Default::default() };
        let mut decoder = rari_flight::codec::Decoder::new(vec![], config.max_row_bytes);
        let decode_err = decoder.feed(b"0:\"0123456789\"\n").unwrap_err();
        let inspect_err = listing("0:\"0123456789\"\n", &config).unwrap_err();
        assert_eq!(decode_err, inspect_err);
    }

    #[test]
    fn test_inspect_counts_carriage_return_toward_the_limit() {
        let config = FlightConfig { max_row_bytes: 8, ..Default::default() };
        let err = listing("0:\"abcd\"\r\n", &config).unwrap_err();
        assert_eq!(err, FlightError::row_too_large(9, 8));
        assert!(listing("0:\"abc\"\r\n", &config).is_ok());
    }
}
