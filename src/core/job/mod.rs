//! Per-video job state machine.
//!
//! A job runs the staged pipeline `init -> probe -> subtitle_select ->
//! asr_prepare -> asr_call -> translate -> finalize`, updating the run meta
//! at every stage boundary. Failures in `asr_*` stages are recorded into the
//! on-disk failure state; every exit path releases the lock, temp files and
//! any registered vocabulary.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::Result;
use crate::config::{AsrMode, Config, HotwordMode, SegmentMode, SubtitleMode};
use crate::core::admission;
use crate::core::glossary::{self, Glossary};
use crate::core::hotwords;
use crate::core::lang::normalize_lang_for_asr;
use crate::core::reuse::{self, Variant};
use crate::core::srt::{self, Cue, validator};
use crate::core::tracks::{self, SubtitleKind, SubtitleTrack};
use crate::core::workinfo::{self, WorkInfo};
use crate::error::SubWatchError;
use crate::services::asr::{self, OfflineOptions, Recognizer, VocabularyService};
use crate::services::chat::ChatModel;
use crate::services::media::MediaToolkit;
use crate::services::metadata::{self, MetadataService, WorkMetadata};
use crate::services::storage::ObjectStore;
use crate::services::translate::{self, TranslateContext, TranslationCache};

pub mod overrides;
pub mod paths;
pub mod run_log;

use overrides::JobOverrides;
use paths::JobPaths;
use run_log::{RunLog, RunStatus};

/// Everything a job needs from the service graph. Clients are shared; the
/// job owns only its per-run state.
pub struct JobServices {
    /// Effective configuration.
    pub config: Arc<Config>,
    /// Media probing and extraction.
    pub media: Arc<dyn MediaToolkit>,
    /// Speech recognition.
    pub recognizer: Option<Arc<dyn Recognizer>>,
    /// Hotword vocabulary lifecycle.
    pub vocabulary: Option<Arc<dyn VocabularyService>>,
    /// Object storage for offline recognition.
    pub store: Option<Arc<dyn ObjectStore>>,
    /// Chat completions for translation and inference.
    pub chat: Option<Arc<dyn ChatModel>>,
    /// Translation cache.
    pub cache: Arc<dyn TranslationCache>,
    /// Metadata resolution.
    pub metadata: Option<Arc<MetadataService>>,
}

struct JobState {
    video_path: PathBuf,
    paths: JobPaths,
    overrides: JobOverrides,
    asr_mode: AsrMode,
    segment_mode: SegmentMode,
    ignore_simplified: bool,
    use_existing: bool,
    stage: String,
    tmp_wav: PathBuf,
    tmp_srt: Option<PathBuf>,
    object_key: Option<String>,
    vocab_id: Option<String>,
    eval_enabled: bool,
    eval_skip_main_srt: bool,
    eval_reference_text: String,
}

/// Deterministic sampling: hash the path and compare against the rate.
fn should_collect_eval(video_path: &Path, collect: bool, sample_rate: f64) -> bool {
    if !collect || sample_rate <= 0.0 {
        return false;
    }
    if sample_rate >= 1.0 {
        return true;
    }
    let digest = Sha256::digest(video_path.to_string_lossy().as_bytes());
    let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as f64
        / u32::MAX as f64;
    value <= sample_rate
}

/// Process one video end to end. Admission (markers, cooldowns, stability,
/// lock) happens here so a queued path that became ineligible while waiting
/// is skipped cheaply.
pub async fn process_video(services: &JobServices, video_path: &Path) {
    let config = &services.config;
    let overrides = overrides::load_overrides(video_path);
    let paths = JobPaths::resolve(
        video_path,
        &config.watcher,
        &config.subtitle.simplified_lang,
    );

    if let Some(reason) = admission::should_skip(&paths, config, overrides.force_once) {
        log::info!("skip {}: {}", video_path.display(), reason.as_str());
        return;
    }
    if !admission::is_stable_file(
        video_path,
        config.watcher.min_bytes,
        config.watcher.stability_dwell_secs,
    )
    .await
    {
        log::info!("skip {}: not yet stable", video_path.display());
        return;
    }
    if !admission::create_lock(&paths.lock) {
        log::info!("skip {}: lock_exists", video_path.display());
        return;
    }

    let asr_mode = asr::resolve_mode(
        overrides.asr_mode.unwrap_or(config.asr.mode),
        &config.asr.model,
    );
    let segment_mode = overrides.segment_mode.unwrap_or(config.asr.segment_mode);
    let mut state = JobState {
        video_path: video_path.to_path_buf(),
        ignore_simplified: overrides
            .ignore_simplified_subtitle
            .unwrap_or(config.subtitle.ignore_simplified),
        use_existing: if overrides.force_asr {
            false
        } else {
            overrides
                .use_existing_subtitle
                .unwrap_or(config.subtitle.use_existing)
        },
        asr_mode,
        segment_mode,
        stage: "init".to_string(),
        tmp_wav: config.watcher.tmp_dir.join(format!(
            "{}-{}.wav",
            paths.name,
            uuid::Uuid::new_v4().simple()
        )),
        tmp_srt: None,
        object_key: None,
        vocab_id: None,
        eval_enabled: should_collect_eval(
            video_path,
            config.eval.collect,
            config.eval.sample_rate,
        ),
        eval_skip_main_srt: false,
        eval_reference_text: String::new(),
        paths,
        overrides,
    };

    let run = RunLog::start(video_path, &state.paths.out_dir, &config.logging);
    run.event(
        "INFO",
        "job started",
        serde_json::json!({
            "run_id": run.run_id,
            "asr_mode": format!("{:?}", state.asr_mode),
            "segment_mode": format!("{:?}", state.segment_mode),
        }),
    );

    let outcome = run_pipeline(services, &mut state, &run).await;

    match &outcome {
        Ok(()) => {
            if config.watcher.move_done {
                let target = config
                    .watcher
                    .done_dir
                    .join(video_path.file_name().unwrap_or_default());
                let _ = std::fs::create_dir_all(&config.watcher.done_dir);
                if let Err(e) = std::fs::rename(video_path, &target) {
                    log::warn!("move to done dir failed: {}", e);
                }
            }
            if state.paths.asr_failed.exists() {
                let _ = std::fs::remove_file(&state.paths.asr_failed);
            }
            if let Err(e) = std::fs::write(&state.paths.done, "done") {
                log::error!("could not write done marker: {}", e);
            }
            log::info!("DONE {}", video_path.display());
            run.update(RunStatus::Done, &state.stage, None);
            if config.watcher.delete_source_after_done && !config.watcher.move_done {
                match std::fs::remove_file(video_path) {
                    Ok(()) => log::info!("deleted source {}", video_path.display()),
                    Err(e) => log::warn!("could not delete source: {}", e),
                }
            }
        }
        Err(e) => {
            log::error!(
                "job failed at {}: {} ({})",
                state.stage,
                video_path.display(),
                e
            );
            run.event(
                "ERROR",
                "job failed",
                serde_json::json!({"stage": state.stage, "error": e.to_string()}),
            );
            if state.stage.starts_with("asr_") {
                record_asr_failure(&state, config, e);
            }
            run.update(RunStatus::Failed, &state.stage, Some(&e.to_string()));
        }
    }

    cleanup(services, &state).await;
}

fn record_asr_failure(state: &JobState, config: &Config, error: &SubWatchError) {
    let previous = admission::load_fail_state(&state.paths.asr_failed);
    let count = previous.count + 1;
    let fatal = config.asr.max_failures > 0 && count >= config.asr.max_failures;
    admission::save_fail_state(
        &state.paths.asr_failed,
        &admission::AsrFailState {
            count,
            ts: run_log::epoch_secs(),
            stage: state.stage.clone(),
            error: error.to_string(),
            fatal,
        },
    );
    if fatal {
        log::error!(
            "ASR failed {} times for {}, giving up until the operator intervenes",
            count,
            state.video_path.display()
        );
    } else {
        log::warn!(
            "ASR failure {} for {}, cooling down {}s",
            count,
            state.video_path.display(),
            config.asr.fail_cooldown_secs
        );
    }
}

async fn cleanup(services: &JobServices, state: &JobState) {
    admission::remove_lock(&state.paths.lock);
    if state.tmp_wav.exists() {
        let _ = std::fs::remove_file(&state.tmp_wav);
    }
    if let Some(tmp_srt) = &state.tmp_srt {
        if tmp_srt.exists() {
            let _ = std::fs::remove_file(tmp_srt);
        }
    }
    if services.config.storage.delete_after_job {
        if let (Some(store), Some(key)) = (&services.store, &state.object_key) {
            if let Err(e) = store.delete(key).await {
                log::error!("object delete failed: {}", e);
            }
        }
    }
    if let (Some(vocabulary), Some(vocab_id)) = (&services.vocabulary, &state.vocab_id) {
        if let Err(e) = vocabulary.delete_vocabulary(vocab_id).await {
            log::warn!("vocabulary delete failed: {}", e);
        }
    }
    if state.overrides.force_once {
        overrides::consume_override(&state.video_path);
    }
}

struct SelectedSubtitle {
    track: SubtitleTrack,
    variant: Variant,
}

async fn classify_track(
    services: &JobServices,
    state: &JobState,
    track: &SubtitleTrack,
) -> Variant {
    let config = &services.config;
    let simplified_lang = &config.subtitle.simplified_lang;
    match track.kind {
        SubtitleKind::External => {
            let name = track.title.clone().unwrap_or_default();
            let Some(path) = &track.path else {
                return Variant::Unknown;
            };
            let sample = reuse::sample_subtitle_text(path, config.subtitle.reuse_sample_chars);
            reuse::describe_external_variant(&name, &sample, simplified_lang)
        }
        SubtitleKind::Embedded => {
            let label = format!(
                "{} {}",
                track.language.clone().unwrap_or_default(),
                track.title.clone().unwrap_or_default()
            );
            match reuse::variant_from_label(&label, simplified_lang) {
                Some(variant @ (Variant::Simplified | Variant::Traditional)) => variant,
                other => {
                    if !matches!(other, Some(Variant::Chinese) | None) {
                        return Variant::Unknown;
                    }
                    // Chinese-but-unspecified or unlabeled: sample content.
                    let tmp = config.watcher.tmp_dir.join(format!(
                        "probe-{}.srt",
                        uuid::Uuid::new_v4().simple()
                    ));
                    let result = services
                        .media
                        .extract_subtitle(&state.video_path, track.index, &tmp)
                        .await;
                    let variant = match result {
                        Ok(()) => {
                            let sample = reuse::sample_subtitle_text(
                                &tmp,
                                config.subtitle.reuse_sample_chars,
                            );
                            reuse::variant_from_text(&sample).unwrap_or(Variant::Unknown)
                        }
                        Err(_) => Variant::Unknown,
                    };
                    let _ = std::fs::remove_file(&tmp);
                    variant
                }
            }
        }
    }
}

/// Load the cues of an existing subtitle source (external file or embedded
/// stream), sanitised.
async fn load_subtitle_source(
    services: &JobServices,
    state: &mut JobState,
    track: &SubtitleTrack,
) -> Result<Vec<Cue>> {
    let config = &services.config;
    let tmp = config.watcher.tmp_dir.join(format!(
        "subtitle-{}.srt",
        uuid::Uuid::new_v4().simple()
    ));
    match track.kind {
        SubtitleKind::External => {
            let source = track
                .path
                .as_ref()
                .ok_or_else(|| SubWatchError::subtitle("SRT", "external track has no path"))?;
            if source
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase() == "srt")
                .unwrap_or(false)
            {
                std::fs::copy(source, &tmp)?;
            } else {
                services.media.convert_subtitle(source, &tmp).await?;
            }
        }
        SubtitleKind::Embedded => {
            services
                .media
                .extract_subtitle(&state.video_path, track.index, &tmp)
                .await?;
        }
    }
    let text = srt::read_text_file(&tmp);
    state.tmp_srt = Some(tmp);
    let mut cues = srt::parse(&text)?;
    for cue in &mut cues {
        cue.text = srt::sanitize_text(&cue.text);
    }
    Ok(cues)
}

async fn run_pipeline(
    services: &JobServices,
    state: &mut JobState,
    run: &RunLog,
) -> Result<()> {
    let config = services.config.clone();

    // --- probe ---
    state.stage = "probe".to_string();
    run.update(RunStatus::Running, &state.stage, None);
    let media_info = services.media.probe(&state.video_path).await;
    let audio_track = tracks::select_audio(&media_info.audio_tracks, &config.audio);
    match &audio_track {
        Some(track) => run.event(
            "INFO",
            "audio track selected",
            serde_json::json!({
                "index": track.index,
                "lang": track.language,
                "title": track.title,
            }),
        ),
        None => log::warn!("no audio track in {}", state.video_path.display()),
    }

    let mut subtitle_candidates: Vec<SubtitleTrack> = media_info.subtitle_tracks.clone();
    for external in reuse::list_external_subtitles(&state.video_path) {
        let codec = external
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_string());
        subtitle_candidates.push(SubtitleTrack {
            index: -1,
            language: external.language.clone(),
            title: Some(external.name.clone()),
            codec,
            is_default: false,
            is_forced: false,
            is_image_based: false,
            kind: SubtitleKind::External,
            path: Some(external.path.clone()),
        });
    }
    let mut selected = tracks::select_subtitle(
        &subtitle_candidates,
        &config.subtitle,
        audio_track.as_ref().and_then(|t| t.language.as_deref()),
    );
    let image_based_reuse = matches!(
        &selected,
        Some(track) if config.subtitle.mode == SubtitleMode::ReuseIfGood && track.is_image_based
    );
    if image_based_reuse {
        if let Some(track) = selected.take() {
            log::warn!(
                "selected subtitle track {} is image-based, reuse rejected",
                track.index
            );
        }
    }

    // --- subtitle_select ---
    state.stage = "subtitle_select".to_string();
    run.update(RunStatus::Running, &state.stage, None);
    let mut simplified: Vec<SelectedSubtitle> = Vec::new();
    let mut others: Vec<SelectedSubtitle> = Vec::new();
    if config.subtitle.mode == SubtitleMode::ReuseIfGood {
        if let Some(track) = selected {
            let variant = classify_track(services, state, &track).await;
            let entry = SelectedSubtitle { track, variant };
            if variant == Variant::Simplified {
                simplified.push(entry);
            } else {
                others.push(entry);
            }
        } else {
            // No single winner: classify everything on disk and in the
            // container.
            for track in &subtitle_candidates {
                if track.is_image_based {
                    continue;
                }
                let variant = classify_track(services, state, track).await;
                let entry = SelectedSubtitle {
                    track: track.clone(),
                    variant,
                };
                if variant == Variant::Simplified {
                    simplified.push(entry);
                } else {
                    others.push(entry);
                }
            }
        }
    }
    // Traditional sources sort ahead of unclassified ones for reuse.
    others.sort_by_key(|entry| match entry.variant {
        Variant::Traditional => 0,
        _ => 1,
    });

    // --- early exit on a reusable simplified target ---
    let simplified_on_disk =
        state.paths.simplified_plain.exists() || state.paths.simplified_llm.exists();
    if !state.ignore_simplified && (!simplified.is_empty() || simplified_on_disk) {
        if !state.eval_enabled {
            log::info!(
                "simplified subtitle present, skipping recognition and translation: {}",
                state.video_path.display()
            );
            if let Some(entry) = simplified.first() {
                match load_subtitle_source(services, state, &entry.track).await {
                    Ok(cues) => {
                        let text = srt::compose(&cues);
                        std::fs::write(&state.paths.srt, &text)?;
                        if state.paths.srt != state.paths.simplified_plain {
                            std::fs::write(&state.paths.simplified_plain, &text)?;
                        }
                        run.event(
                            "INFO",
                            "simplified subtitle saved",
                            serde_json::json!({"output": state.paths.srt.to_string_lossy()}),
                        );
                    }
                    Err(e) => {
                        log::error!("could not extract simplified subtitle: {}", e);
                    }
                }
            }
            state.stage = "finalize".to_string();
            return Ok(());
        }
        // Evaluation mode proceeds, keeping the simplified text as the
        // reference and never overwriting the primary SRT.
        state.eval_skip_main_srt = true;
        if let Some(entry) = simplified.first() {
            if let Ok(cues) = load_subtitle_source(services, state, &entry.track).await {
                state.eval_reference_text = srt::compose(&cues);
            }
        } else if state.paths.simplified_plain.exists() {
            state.eval_reference_text = srt::read_text_file(&state.paths.simplified_plain);
        }
    }

    // --- reuse-or-recognise ---
    let mut cues: Option<Vec<Cue>> = None;
    if !others.is_empty() && state.use_existing {
        log::info!(
            "existing subtitle found, trying direct reuse: {}",
            state.video_path.display()
        );
        let entry = &others[0];
        match load_subtitle_source(services, state, &entry.track).await {
            Ok(loaded) => {
                let mut accepted = true;
                if config.subtitle.reuse_min_confidence > 0.0 {
                    let text = srt::compose(&loaded);
                    let sample: String = text
                        .chars()
                        .take(config.subtitle.reuse_sample_chars)
                        .collect();
                    let track_lang = entry.track.language.clone().unwrap_or_default();
                    let audio_lang = audio_track
                        .as_ref()
                        .and_then(|t| t.language.clone())
                        .unwrap_or_default();
                    let src_lang = if config.translate.src_lang != "auto" {
                        config.translate.src_lang.clone()
                    } else {
                        String::new()
                    };
                    let hints: Vec<&str> =
                        vec![track_lang.as_str(), audio_lang.as_str(), src_lang.as_str()];
                    let confidence = reuse::reuse_confidence(&sample, &hints);
                    if confidence < config.subtitle.reuse_min_confidence {
                        log::warn!(
                            "subtitle language confidence {:.3} below {}, falling back to recognition",
                            confidence,
                            config.subtitle.reuse_min_confidence
                        );
                        accepted = false;
                    }
                }
                if accepted {
                    std::fs::write(&state.paths.srt, srt::compose(&loaded))?;
                    run.event(
                        "INFO",
                        "existing subtitle reused",
                        serde_json::json!({"output": state.paths.srt.to_string_lossy()}),
                    );
                    cues = Some(loaded);
                }
            }
            Err(e) => {
                log::error!("existing subtitle unreadable, falling back to recognition: {}", e);
            }
        }
    }

    // --- asr_prepare ---
    state.stage = "asr_prepare".to_string();
    run.update(RunStatus::Running, &state.stage, None);
    let mut hotword_list: Vec<String> = Vec::new();
    if cues.is_none() {
        if !others.is_empty() && !state.use_existing {
            log::info!("ignoring existing subtitles, proceeding to recognition");
        }
        if !state.overrides.force_asr && others.is_empty() && state.paths.srt.exists() {
            let text = srt::read_text_file(&state.paths.srt);
            match srt::parse(&text) {
                Ok(parsed) if !parsed.is_empty() => {
                    log::info!("reusing previously generated {}", state.paths.srt.display());
                    cues = Some(parsed);
                }
                _ => {
                    log::error!("generated SRT unreadable, falling back to recognition");
                }
            }
        } else if state.overrides.force_asr && state.paths.srt.exists() {
            log::info!("force_asr set, ignoring generated {}", state.paths.srt.display());
        }
    }
    if cues.is_none() {
        let path_info = workinfo::guess_from_path(&state.video_path);
        let alias_map = glossary::load_title_aliases(&config.metadata.title_aliases_path);
        let title_aliases = path_info
            .title
            .as_deref()
            .map(|title| glossary::resolve_title_aliases(title, &alias_map))
            .unwrap_or_default();
        let mut glossary_titles: Vec<String> = Vec::new();
        if let Some(title) = &path_info.title {
            glossary_titles.push(title.clone());
        }
        glossary_titles.extend(title_aliases.iter().cloned());
        let work_glossary = if config.translate.work_glossary_enabled {
            glossary::load_work_glossary_by_titles(
                &config.translate.work_glossary_dir,
                &glossary_titles,
            )
        } else {
            Glossary::new()
        };
        let asr_lang = normalize_lang_for_asr(
            audio_track
                .as_ref()
                .and_then(|t| t.language.as_deref())
                .unwrap_or(&config.translate.src_lang),
        );
        hotword_list = hotwords::build_hotwords(
            None,
            &work_glossary,
            &title_aliases,
            &asr_lang,
            &config.hotwords,
            &config.asr.language_hints,
        );
        if !hotword_list.is_empty() {
            log::info!("{} hotwords active", hotword_list.len());
            if config.hotwords.mode == HotwordMode::Vocabulary {
                if let Some(vocabulary) = &services.vocabulary {
                    let items = hotwords::build_hotword_items(
                        &hotword_list,
                        &asr_lang,
                        &config.hotwords,
                        &config.asr.language_hints,
                    );
                    if !items.is_empty() {
                        let target_model = if config.hotwords.target_model.is_empty() {
                            config.asr.model.clone()
                        } else {
                            config.hotwords.target_model.clone()
                        };
                        match vocabulary
                            .create_vocabulary(&items, &config.hotwords.prefix, &target_model)
                            .await
                        {
                            Ok(id) => {
                                run.event(
                                    "INFO",
                                    "vocabulary registered",
                                    serde_json::json!({"vocab_id": id}),
                                );
                                state.vocab_id = Some(id);
                            }
                            Err(e) => log::warn!("vocabulary create failed: {}", e),
                        }
                    }
                }
            }
        }
        services
            .media
            .extract_wav(
                &state.video_path,
                &state.tmp_wav,
                audio_track.as_ref().map(|t| t.index),
                config.asr.sample_rate,
            )
            .await?;
    }

    // --- asr_call ---
    state.stage = "asr_call".to_string();
    run.update(RunStatus::Running, &state.stage, None);
    if cues.is_none() {
        let recognizer = services
            .recognizer
            .as_ref()
            .ok_or_else(|| SubWatchError::asr("no recognizer configured"))?;
        let recognised = match state.asr_mode {
            AsrMode::Realtime | AsrMode::Auto => {
                if !hotword_list.is_empty()
                    && config.hotwords.mode == HotwordMode::Param
                {
                    log::warn!("realtime recognition ignores param-mode hotwords");
                }
                let outcome = asr::run_realtime(
                    recognizer.as_ref(),
                    &state.tmp_wav,
                    state.vocab_id.clone(),
                    state.segment_mode,
                    &config.asr,
                    &config.watcher.tmp_dir,
                )
                .await?;
                if config.asr.save_raw_json {
                    let _ = std::fs::write(
                        &state.paths.raw_json,
                        serde_json::to_string_pretty(&outcome.responses)?,
                    );
                }
                outcome.cues
            }
            AsrMode::Offline => {
                let store = services
                    .store
                    .as_ref()
                    .ok_or_else(|| SubWatchError::asr("offline mode without object store"))?;
                let key = format!(
                    "{}{}",
                    config.storage.prefix,
                    state
                        .tmp_wav
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default()
                );
                store.put(&state.tmp_wav, &key).await.map_err(|e| {
                    SubWatchError::asr(format!("audio upload failed: {}", e))
                })?;
                state.object_key = Some(key.clone());
                let url = store.url(&key);
                let opts = OfflineOptions {
                    vocabulary_id: state.vocab_id.clone(),
                    hotwords: (!hotword_list.is_empty()
                        && config.hotwords.mode == HotwordMode::Param)
                        .then(|| hotword_list.clone()),
                };
                let response = recognizer.transcribe_offline(&url, &opts).await?;
                if config.asr.save_raw_json {
                    let _ = std::fs::write(
                        &state.paths.raw_json,
                        serde_json::to_string_pretty(&response)?,
                    );
                }
                asr::build_cues(&response, state.segment_mode, &config.asr)?
            }
        };

        let mut recognised = recognised;
        if config.subtitle.validate {
            let (fixed, issues) = validator::validate(&recognised);
            if !issues.is_empty() && config.subtitle.auto_fix {
                log::warn!("SRT repaired: {} issues", issues.len());
                recognised = fixed;
            }
        }
        if state.eval_skip_main_srt {
            log::info!("evaluation mode: not overwriting {}", state.paths.srt.display());
        } else {
            std::fs::write(&state.paths.srt, srt::compose(&recognised))?;
            run.event(
                "INFO",
                "recognition complete",
                serde_json::json!({"output": state.paths.srt.to_string_lossy()}),
            );
        }
        cues = Some(recognised);
    }

    // --- translate ---
    state.stage = "translate".to_string();
    run.update(RunStatus::Running, &state.stage, None);
    if config.translate.enabled || state.overrides.force_translate {
        let source_cues = cues.as_deref().unwrap_or(&[]);
        if let Err(e) = translate_stage(services, state, run, source_cues).await {
            // Translation failures are recorded per language; an init
            // failure lands in the default failure log. The job itself
            // continues to finalize so recognition output survives.
            let failed_log = state.paths.translate_failed(
                config
                    .translate
                    .dst_langs
                    .first()
                    .map(String::as_str)
                    .unwrap_or("unknown"),
                true,
            );
            append_translate_failure(&failed_log, &e.to_string());
            log::error!("translation setup failed: {}", e);
        }
    }

    state.stage = "finalize".to_string();
    run.update(RunStatus::Running, &state.stage, None);
    Ok(())
}

fn append_translate_failure(log_path: &Path, error: &str) {
    use std::io::Write;
    if let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    {
        let _ = writeln!(file, "TRANSLATE_FAILED: {}", error);
    }
}

async fn translate_stage(
    services: &JobServices,
    state: &mut JobState,
    run: &RunLog,
    cues: &[Cue],
) -> Result<()> {
    let config = services.config.clone();
    let chat = services
        .chat
        .clone()
        .ok_or_else(|| SubWatchError::translation("no chat model configured"))?;

    if cues.is_empty() {
        log::error!("translation skipped: no subtitle content");
        return Ok(());
    }

    // Sample lines feed work-info inference and metadata search.
    let mut sample_lines: Vec<String> = Vec::new();
    'outer: for cue in cues {
        for line in cue.text.lines() {
            let line = line.trim();
            if !line.is_empty() {
                sample_lines.push(line.to_string());
            }
            if sample_lines.len() >= 30 {
                break 'outer;
            }
        }
    }

    let mut work_info =
        workinfo::detect(&state.video_path, &sample_lines, Some(chat.as_ref())).await;
    let nfo = metadata::load_nfo_info(
        &state.video_path,
        config.metadata.nfo_enabled,
        config.metadata.nfo_same_name_only,
    );
    if let Some((nfo_info, nfo_path)) = &nfo {
        run.event(
            "INFO",
            "nfo found",
            serde_json::json!({
                "nfo": nfo_path.to_string_lossy(),
                "type": nfo_info.kind,
                "title": nfo_info.title,
            }),
        );
        let title = work_info.title.clone().or_else(|| nfo_info.title.clone());
        let season = work_info
            .season
            .clone()
            .or_else(|| nfo_info.season.map(|s| s.to_string()));
        let episode = work_info
            .episode
            .clone()
            .or_else(|| nfo_info.episode.map(|e| e.to_string()));
        if title != work_info.title || season != work_info.season || episode != work_info.episode
        {
            work_info = WorkInfo {
                title,
                season,
                episode,
                confidence: work_info.confidence.max(0.6),
                source: format!("{}+nfo", work_info.source),
            };
        }
    }

    let raw_glossary = glossary::load_glossary_yaml(&config.translate.glossary_path);
    let base_glossary = glossary::build_effective_glossary(
        &raw_glossary,
        Some(&work_info),
        config.translate.glossary_confidence_threshold,
    );

    let mut resolved_metadata: Option<WorkMetadata> = None;
    if config.metadata.enabled {
        if let Some(service) = &services.metadata {
            let alias_map = glossary::load_title_aliases(&config.metadata.title_aliases_path);
            let mut title_aliases = work_info
                .title
                .as_deref()
                .map(|title| glossary::resolve_title_aliases(title, &alias_map))
                .unwrap_or_default();
            if config.metadata.llm_title_alias_enabled {
                let llm_aliases = metadata::refine_aliases_via_llm(
                    &work_info,
                    &sample_lines,
                    chat.as_ref(),
                    &state.video_path.to_string_lossy(),
                )
                .await;
                title_aliases.extend(llm_aliases);
            }
            if let Some((nfo_info, _)) = &nfo {
                for value in [
                    nfo_info.title.clone(),
                    nfo_info.original_title.clone(),
                    nfo_info.episode_title.clone(),
                ]
                .into_iter()
                .flatten()
                {
                    title_aliases.push(value);
                }
            }
            let mut seen = std::collections::HashSet::new();
            title_aliases.retain(|alias| !alias.is_empty() && seen.insert(alias.clone()));

            let mut snippets = BTreeMap::new();
            let snippet_lang = if config.translate.src_lang.is_empty() {
                "und".to_string()
            } else {
                config.translate.src_lang.clone()
            };
            snippets.insert(
                snippet_lang,
                sample_lines.iter().take(50).cloned().collect::<Vec<_>>(),
            );
            let query = metadata::build_work_query(
                &state.video_path,
                Some(&work_info),
                snippets,
                config.metadata.language_priority.clone(),
                title_aliases,
                nfo.as_ref().map(|(info, path)| (info, path.as_path())),
            );
            resolved_metadata = service.resolve(&query).await;
            if config.metadata.debug {
                if let Some(metadata) = &resolved_metadata {
                    let dump = serde_json::json!({
                        "query": query,
                        "metadata": metadata,
                    });
                    let _ = std::fs::write(
                        state.paths.metadata_debug(),
                        serde_json::to_string_pretty(&dump)?,
                    );
                }
            }
        }
    }
    if let Some(manual_dir) =
        metadata::manual_dir_for(&state.paths.out_dir, &config.metadata.manual_dir)
    {
        if let Some(manual) = metadata::load_manual_metadata(&state.video_path, &manual_dir) {
            log::info!("manual metadata hit for {}", state.video_path.display());
            resolved_metadata = Some(manual);
        }
    }

    let work_glossary = if config.translate.work_glossary_enabled {
        let titles = resolved_metadata
            .as_ref()
            .map(|m| m.all_titles())
            .unwrap_or_default();
        glossary::load_work_glossary_by_titles(&config.translate.work_glossary_dir, &titles)
    } else {
        Glossary::new()
    };

    let mut allow_translate = true;
    if state.overrides.force_translate {
        log::info!("force_translate set");
    } else {
        let duration = services.media.duration_seconds(&state.video_path).await;
        if let Some(duration) = duration {
            if duration < config.translate.min_duration_secs {
                allow_translate = false;
                log::info!(
                    "skipping translation: {:.1}s below minimum {:.1}s",
                    duration,
                    config.translate.min_duration_secs
                );
            }
        }
    }
    if !allow_translate {
        return Ok(());
    }

    let dst_langs = config
        .translate
        .effective_dst_langs(&config.subtitle.simplified_lang);
    if dst_langs.is_empty() {
        return Err(SubWatchError::translation("no destination languages"));
    }
    let bi_lang = if config.translate.bilingual_lang.is_empty() {
        dst_langs[0].clone()
    } else {
        config.translate.bilingual_lang.clone()
    };
    let multiple = dst_langs.len() > 1;

    run.event(
        "INFO",
        "translation started",
        serde_json::json!({"dst_langs": dst_langs, "bilingual": config.translate.bilingual}),
    );

    for dst_lang in &dst_langs {
        let trans_path = state.paths.translated(dst_lang, &config.subtitle.simplified_lang);
        let failed_log = state.paths.translate_failed(dst_lang, multiple);
        let mut merged_glossary = base_glossary.clone();
        if let Some(metadata) = &resolved_metadata {
            merged_glossary.extend(metadata.character_glossary(dst_lang));
        }
        merged_glossary.extend(work_glossary.clone());

        let ctx = TranslateContext {
            chat: chat.clone(),
            cache: services.cache.clone(),
            cfg: &config.translate,
            src_lang: &config.translate.src_lang,
            dst_lang,
            work_info: Some(&work_info),
            glossary: &merged_glossary,
            metadata: resolved_metadata.as_ref(),
            failed_log: &failed_log,
        };

        let mut translated = translate::translate_cues(&ctx, cues).await;
        if config.subtitle.validate {
            let (fixed, issues) = validator::validate(&translated);
            if !issues.is_empty() && config.subtitle.auto_fix {
                log::warn!(
                    "translated SRT repaired for {}: {} issues",
                    dst_lang,
                    issues.len()
                );
                translated = fixed;
            }
        }
        let trans_text = srt::compose(&translated);
        std::fs::write(&trans_path, &trans_text)?;

        if config.translate.bilingual && dst_lang == &bi_lang {
            let bilingual = translate::build_bilingual(
                cues,
                &translated,
                config.translate.bilingual_order,
            );
            std::fs::write(&state.paths.bilingual, srt::compose(&bilingual))?;
        }
        if state.eval_enabled
            && dst_lang == &config.subtitle.simplified_lang
            && !state.eval_reference_text.is_empty()
        {
            save_eval_sample(state, &config, &srt::compose(cues), &trans_text);
        }
        run.event(
            "INFO",
            "translation complete",
            serde_json::json!({"lang": dst_lang, "output": trans_path.to_string_lossy()}),
        );
    }
    Ok(())
}

fn save_eval_sample(
    state: &JobState,
    config: &Config,
    source_text: &str,
    candidate_text: &str,
) {
    let eval_dir = if Path::new(&config.eval.output_dir).is_absolute() {
        PathBuf::from(&config.eval.output_dir)
    } else {
        state.paths.out_dir.join(&config.eval.output_dir)
    };
    if std::fs::create_dir_all(&eval_dir).is_err() {
        return;
    }
    let name = &state.paths.name;
    let _ = std::fs::write(
        eval_dir.join(format!("{}.eval.ref.srt", name)),
        &state.eval_reference_text,
    );
    let _ = std::fs::write(eval_dir.join(format!("{}.eval.src.srt", name)), source_text);
    let _ = std::fs::write(
        eval_dir.join(format!("{}.eval.cand.srt", name)),
        candidate_text,
    );
    let meta = serde_json::json!({
        "path": state.video_path.to_string_lossy(),
        "asr_mode": format!("{:?}", state.asr_mode),
        "segment_mode": format!("{:?}", state.segment_mode),
        "timestamp": run_log::epoch_secs(),
    });
    let _ = std::fs::write(
        eval_dir.join(format!("{}.eval.json", name)),
        serde_json::to_string_pretty(&meta).unwrap_or_default(),
    );
}
