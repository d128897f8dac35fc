//! Strategy composition
//!
//! Each strategy is a fixed sequence of the correlation, GEVD, application,
//! echo-cancellation and post-filter stages. Every stage runs once over the
//! whole recording and is applied to all component views, so the output of
//! each component is available for evaluation.
//!
//! | Strategy     | Stages                                        | Rank              |
//! |--------------|-----------------------------------------------|-------------------|
//! | MWF          | NR on microphones                             | `rank_s`          |
//! | MWFext       | NR on microphones + loudspeakers              | `rank_s`          |
//! | AEC-NR       | AEC, then NR on the residual                  | `rank_s`          |
//! | NR-AEC       | NR, then AEC on the filtered microphones      | `rank_s`          |
//! | NRext-AEC-PF | extended NR, AEC, post-filter                 | `rank_ses`        |

use std::ops::Range;

use jaec_core::{
    ActivityMasks, FreqSignal, JaecError, JaecResult, Mask, ProcessingConfig, Scene, Strategy,
    Views,
};

use crate::apply::SpatialFilter;
use crate::correlation;
use crate::echo;
use crate::gevd;
use crate::postfilter;

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Run the configured strategy
pub fn process(
    scene: &Scene,
    masks: &ActivityMasks,
    config: &ProcessingConfig,
) -> JaecResult<Views<FreqSignal>> {
    run(config.strategy, scene, masks, config)
}

/// Run one strategy, returning `M`-channel output views
pub fn run(
    strategy: Strategy,
    scene: &Scene,
    masks: &ActivityMasks,
    config: &ProcessingConfig,
) -> JaecResult<Views<FreqSignal>> {
    config.validate_for(strategy)?;
    check_scene(scene, masks, config)?;

    log::info!(
        "{}: {} microphones, {} loudspeakers, {} frames x {} bins",
        strategy,
        scene.num_mics(),
        scene.num_loudspeakers(),
        scene.frames(),
        scene.bins()
    );

    let output = match strategy {
        Strategy::Mwf => mwf(scene, masks, config),
        Strategy::MwfExt => mwf_ext(scene, masks, config),
        Strategy::AecNr => aec_nr(scene, masks, config),
        Strategy::NrAec => nr_aec(scene, masks, config),
        Strategy::NrExtAecPf => nrext_aec_pf(scene, masks, config),
    }?;

    log::info!("{}: done, {} output channels", strategy, output.channels());
    Ok(output)
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRATEGIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Multichannel Wiener filter on the microphones
pub fn mwf(
    scene: &Scene,
    masks: &ActivityMasks,
    config: &ProcessingConfig,
) -> JaecResult<Views<FreqSignal>> {
    noise_reduction(&scene.mic, masks, config.rank_s, 0..scene.num_mics(), config)
}

/// Wiener filter on the stacked microphone and loudspeaker signals
///
/// Only the microphone outputs are kept. With no loudspeakers this is
/// exactly [`mwf`].
pub fn mwf_ext(
    scene: &Scene,
    masks: &ActivityMasks,
    config: &ProcessingConfig,
) -> JaecResult<Views<FreqSignal>> {
    let extended = scene.extended()?;
    noise_reduction(&extended, masks, config.rank_s, 0..scene.num_mics(), config)
}

/// Echo cancellation, then noise reduction on the residual
pub fn aec_nr(
    scene: &Scene,
    masks: &ActivityMasks,
    config: &ProcessingConfig,
) -> JaecResult<Views<FreqSignal>> {
    let residual = echo_cancellation(&scene.extended()?, masks, scene.num_mics())?;
    noise_reduction(&residual, masks, config.rank_s, 0..scene.num_mics(), config)
}

/// Noise reduction, then echo cancellation on the filtered microphones
pub fn nr_aec(
    scene: &Scene,
    masks: &ActivityMasks,
    config: &ProcessingConfig,
) -> JaecResult<Views<FreqSignal>> {
    let filtered = noise_reduction(&scene.mic, masks, config.rank_s, 0..scene.num_mics(), config)?;
    let extended = filtered.try_zip(&scene.loudspeaker, |m, l| m.stack_channels(l))?;
    echo_cancellation(&extended, masks, scene.num_mics())
}

/// Extended noise reduction, echo cancellation and residual post-filter
///
/// The extended filter is designed on "speech and echo active" against
/// "both inactive" frames with rank `rank_ses`. Its microphone-to-loudspeaker
/// block is forced to zero so the loudspeaker outputs stay a function of the
/// loudspeaker inputs only and remain a clean echo reference.
///
/// The post-filter reuses that factorization: its present-regime and
/// residual correlations are mapped through the microphone block `W11`, so
/// no second design runs on the echo-cancelled signal.
pub fn nrext_aec_pf(
    scene: &Scene,
    masks: &ActivityMasks,
    config: &ProcessingConfig,
) -> JaecResult<Views<FreqSignal>> {
    let m = scene.num_mics();
    let c = m + scene.num_loudspeakers();
    let extended = scene.extended()?;

    log::debug!("NRext: rank {} over {} channels", config.rank_ses, c);
    let pair = correlation::estimate(
        &extended.mixture,
        &masks.both_active()?,
        &masks.both_inactive()?,
        "speech-and-echo",
        "speech-and-echo-absent",
    )?
    .load_absent(config.diagonal_loading);
    let design = gevd::synthesize(&pair, config.rank_ses)?;
    let extended_filter = design.filter.zero_block(0..m, m..c)?;
    let enhanced = extended_filter.apply_views(&extended)?;

    let cancelled = echo_cancellation(&enhanced, masks, m)?;

    log::debug!("post-filter: {} microphone outputs", m);
    let w11 = extended_filter.block(0..m, 0..m)?;
    let present = postfilter::output_statistics(&pair.a, &w11)?;
    let residual = postfilter::output_statistics(&design.residual, &w11)?;
    postfilter::postfilter(&present, &residual, &w11)?.apply_views(&cancelled)
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGES
// ═══════════════════════════════════════════════════════════════════════════════

fn speech_correlation(
    signal: &FreqSignal,
    masks: &ActivityMasks,
    config: &ProcessingConfig,
) -> JaecResult<correlation::CorrelationPair> {
    Ok(correlation::estimate(
        signal,
        &masks.speech_present(),
        &masks.speech_absent(),
        "speech-present",
        "speech-absent",
    )?
    .load_absent(config.diagonal_loading))
}

fn noise_reduction(
    views: &Views<FreqSignal>,
    masks: &ActivityMasks,
    rank: usize,
    outputs: Range<usize>,
    config: &ProcessingConfig,
) -> JaecResult<Views<FreqSignal>> {
    log::debug!(
        "NR: rank {} over {} channels, keeping outputs {:?}",
        rank,
        views.channels(),
        outputs
    );
    let pair = speech_correlation(&views.mixture, masks, config)?;
    let filter: SpatialFilter = gevd::synthesize(&pair, rank)?.filter.select_outputs(outputs)?;
    filter.apply_views(views)
}

fn echo_cancellation(
    extended: &Views<FreqSignal>,
    masks: &ActivityMasks,
    num_mics: usize,
) -> JaecResult<Views<FreqSignal>> {
    log::debug!(
        "AEC: {} microphones, {} loudspeakers",
        num_mics,
        extended.channels() - num_mics
    );
    let echo_only: Mask = masks.echo_only()?;
    let path = echo::estimate_echo(&extended.mixture, &echo_only, num_mics)?;
    path.cancel_views(extended)
}

fn check_scene(scene: &Scene, masks: &ActivityMasks, config: &ProcessingConfig) -> JaecResult<()> {
    if scene.num_mics() != config.num_mics || scene.num_loudspeakers() != config.num_loudspeakers {
        return Err(JaecError::config(format!(
            "scene has {} microphones and {} loudspeakers, configuration expects {} and {}",
            scene.num_mics(),
            scene.num_loudspeakers(),
            config.num_mics,
            config.num_loudspeakers
        )));
    }
    masks.speech.check_matches(&scene.mic.mixture)?;
    masks.echo.check_matches(&scene.mic.mixture)
}
