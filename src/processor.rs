//! Translates every class of a set of dex files on a pool of worker threads.
//!
//! Workers pull `(dex, class)` pairs from a shared injector and translate
//! whole classes. Results go into one aggregate behind a mutex, which is
//! only held long enough to check for and record a name.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_deque::{Injector, Steal};
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::dex::{DexClass, DexFile};
use crate::error::TranslateError;
use crate::jvm::{ClassWriter, OptimizationOptions};

/// How often, in processed classes, progress is reported.
const PROGRESS_INTERVAL: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig
{
    pub options: OptimizationOptions,
    /// Record failed classes and keep going instead of stopping at the first one.
    pub allow_errors: bool,
    pub workers: usize,
}

impl Default for ProcessorConfig
{
    fn default() -> Self
    {
        ProcessorConfig { options: OptimizationOptions::default(), allow_errors: true, workers: num_cpus::get() }
    }
}

/// Receives progress and finished classes. Called from worker threads.
pub trait ProcessCallback: Send + Sync
{
    fn on_progress(&self, translated: usize, warnings: usize, errors: usize, total: usize);

    fn on_class_translated(&self, _name: &str, _bytes: &[u8]) {}
}

/// Reports progress through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCallback;

impl ProcessCallback for LogCallback
{
    fn on_progress(&self, translated: usize, warnings: usize, errors: usize, total: usize)
    {
        info!("[processor] {}/{} classes translated, {} warnings, {} errors", translated, total, warnings, errors);
    }
}

/// Everything a run produced, keyed by output file name (`a/B.class`).
#[derive(Debug, Default)]
pub struct ProcessResult
{
    pub classes: BTreeMap<String, Vec<u8>>,
    pub warnings: BTreeMap<String, Vec<String>>,
    pub errors: BTreeMap<String, TranslateError>,
}

impl ProcessResult
{
    fn is_taken(&self, name: &str) -> bool
    {
        self.classes.contains_key(name) || self.errors.contains_key(name)
    }

    fn warn(&mut self, name: &str, msg: String)
    {
        self.warnings.entry(name.to_string()).or_default().push(msg);
    }
}

#[derive(Default)]
struct Aggregate
{
    result: ProcessResult,
    processed: usize,
    failure: Option<TranslateError>,
}

impl Aggregate
{
    fn counts(&self) -> (usize, usize, usize)
    {
        (self.result.classes.len(), self.result.warnings.len(), self.result.errors.len())
    }
}

pub struct Processor
{
    config: ProcessorConfig,
}

impl Processor
{
    pub fn new(config: ProcessorConfig) -> Self
    {
        Processor { config }
    }

    /// Translates all classes of `dexes`. In strict mode the first failure
    /// stops the run and is returned; classes already in flight finish but
    /// no new ones are started.
    pub fn process(&self, dexes: &[DexFile], callback: &dyn ProcessCallback) -> Result<ProcessResult, TranslateError>
    {
        let injector = Injector::new();
        let mut total = 0;
        for (d, dex) in dexes.iter().enumerate()
        {
            for c in 0..dex.classes.len()
            {
                injector.push((d, c));
                total += 1;
            }
        }

        let aggregate = Mutex::new(Aggregate::default());
        let cancelled = AtomicBool::new(false);
        callback.on_progress(0, 0, 0, total);

        let workers = self.config.workers.clamp(1, total.max(1));
        thread::scope(|scope| {
            for _ in 0..workers
            {
                scope.spawn(|| loop
                {
                    if cancelled.load(Ordering::Acquire)
                    {
                        break;
                    }
                    match injector.steal()
                    {
                        Steal::Success((d, c)) =>
                        {
                            let dex = &dexes[d];
                            self.process_class(dex, &dex.classes[c], &aggregate, &cancelled, callback, total);
                        }
                        Steal::Retry => continue,
                        Steal::Empty => break,
                    }
                });
            }
        });

        let aggregate = aggregate.into_inner();
        if let Some(e) = aggregate.failure
        {
            return Err(e);
        }
        let (translated, warnings, errors) = aggregate.counts();
        callback.on_progress(translated, warnings, errors, total);
        Ok(aggregate.result)
    }

    fn process_class(
        &self,
        dex: &DexFile,
        cls: &DexClass,
        aggregate: &Mutex<Aggregate>,
        cancelled: &AtomicBool,
        callback: &dyn ProcessCallback,
        total: usize,
    )
    {
        let name = format!("{}.class", cls.name);

        // a name already taken is not worth translating again
        let taken = aggregate.lock().result.is_taken(&name);
        let outcome = if taken { None } else { Some(ClassWriter::new(dex, self.config.options).to_class_file(cls)) };

        let mut translated = None;
        let progress = {
            let mut agg = aggregate.lock();
            match outcome
            {
                // a failed class still owns its name
                Some(_) if agg.result.is_taken(&name) =>
                {
                    warn!("[processor] Duplicate class name {}", name);
                    agg.result.warn(&name, format!("Duplicate class name {}", name));
                }
                None =>
                {
                    warn!("[processor] Duplicate class name {}", name);
                    agg.result.warn(&name, format!("Duplicate class name {}", name));
                }
                Some(Ok(bytes)) =>
                {
                    agg.result.classes.insert(name.clone(), bytes.clone());
                    translated = Some(bytes);
                }
                Some(Err(e)) if self.config.allow_errors =>
                {
                    warn!("[processor] Failed to translate {}: {}", name, e);
                    agg.result.errors.insert(name.clone(), e);
                }
                Some(Err(e)) =>
                {
                    if agg.failure.is_none()
                    {
                        agg.failure = Some(e);
                    }
                    cancelled.store(true, Ordering::Release);
                }
            }
            agg.processed += 1;
            if agg.processed % PROGRESS_INTERVAL == 0 { Some(agg.counts()) } else { None }
        };

        if let Some(bytes) = translated
        {
            callback.on_class_translated(&name, &bytes);
        }
        if let Some((t, w, e)) = progress
        {
            callback.on_progress(t, w, e, total);
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    struct Counting
    {
        progress: Mutex<Vec<(usize, usize)>>,
        translated: Mutex<Vec<String>>,
    }

    impl ProcessCallback for Counting
    {
        fn on_progress(&self, translated: usize, _warnings: usize, _errors: usize, total: usize)
        {
            self.progress.lock().push((translated, total));
        }

        fn on_class_translated(&self, name: &str, _bytes: &[u8])
        {
            self.translated.lock().push(name.to_string());
        }
    }

    fn class(name: &str) -> DexClass
    {
        DexClass {
            name: name.to_string(),
            access: 0,
            super_class: Some("java/lang/Object".to_string()),
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
        }
    }

    #[test]
    fn reports_start_and_end()
    {
        let mut dex = DexFile::new();
        dex.classes = vec![class("a/A"), class("a/B")];
        let callback = Counting { progress: Mutex::new(vec![]), translated: Mutex::new(vec![]) };
        let config = ProcessorConfig { workers: 2, ..ProcessorConfig::default() };
        let result = Processor::new(config).process(&[dex], &callback).unwrap();

        assert_eq!(result.classes.keys().collect::<Vec<_>>(), vec!["a/A.class", "a/B.class"]);
        assert_eq!(*callback.progress.lock(), vec![(0, 2), (2, 2)]);
        let mut names = callback.translated.lock().clone();
        names.sort();
        assert_eq!(names, vec!["a/A.class", "a/B.class"]);
    }

    #[test]
    fn empty_input()
    {
        let result = Processor::new(ProcessorConfig::default()).process(&[], &LogCallback).unwrap();
        assert!(result.classes.is_empty());
    }
}
