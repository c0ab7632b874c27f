use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::Context;
use indicatif::ProgressBar;

use crate::{
    config::MinifyOptions,
    geofile::geojson::{for_each_feature, FeatureCollectionWriter},
    minify::key_minifier::KeyMinifier,
};

use super::stage::TransformChain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutcome {
    pub features_read: usize,
    pub features_written: usize,
}

/// Parse features one at a time from `reader`, push each through `chain` and write the survivors
/// to `sink`. Parsing only continues once the previous feature has been written, so at most one
/// feature is in flight.
pub fn run_stream<R, W>(
    reader: R,
    chain: &mut TransformChain<'_>,
    sink: &mut FeatureCollectionWriter<W>,
    progress: &ProgressBar,
) -> anyhow::Result<()>
where
    R: Read,
    W: Write,
{
    let mut index = 0;
    for_each_feature(reader, |feature| {
        if let Some(feature) = chain.apply(feature)? {
            sink.write_feature(&feature)
                .with_context(|| format!("Writing feature {}", index))?;
        }
        index += 1;
        progress.inc(1);
        Ok(())
    })
}

/// Minify a GeoJSON FeatureCollection from `reader` into `writer`. The key map of `minifier` is
/// appended to the output when requested.
pub fn minify_stream<R: Read, W: Write>(
    reader: R,
    writer: W,
    options: &MinifyOptions,
    minifier: &mut KeyMinifier,
    progress: &ProgressBar,
) -> anyhow::Result<(W, StreamOutcome)> {
    let mut sink = FeatureCollectionWriter::new(writer)?;
    let features_read = {
        let mut chain = TransformChain::for_streaming(options, minifier);
        log::debug!("Streaming through {}", chain.stage_names().join(" -> "));
        run_stream(reader, &mut chain, &mut sink, progress)?;
        chain.features_seen()
    };
    let features_written = sink.features_written();
    let key_map = options.include_key_map.then(|| minifier.key_map());
    let writer = sink.finish(key_map.as_ref())?;
    Ok((
        writer,
        StreamOutcome {
            features_read,
            features_written,
        },
    ))
}

/// Stream `input_filepath` into `output_filepath`. A failure leaves the partially written output
/// in place.
pub fn minify_file(
    input_filepath: &Path,
    output_filepath: &Path,
    options: &MinifyOptions,
    minifier: &mut KeyMinifier,
    progress: &ProgressBar,
) -> anyhow::Result<StreamOutcome> {
    let source = File::open(input_filepath)
        .with_context(|| format!("Opening {}", input_filepath.display()))?;
    let sink = File::create(output_filepath)
        .with_context(|| format!("Creating {}", output_filepath.display()))?;
    let (_, outcome) = minify_stream(
        BufReader::new(source),
        BufWriter::new(sink),
        options,
        minifier,
        progress,
    )?;
    Ok(outcome)
}
