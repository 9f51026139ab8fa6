use analysis_session::BatchStrategy;
use clap::ValueEnum;

#[derive(Copy, Clone, Default, ValueEnum)]
pub(crate) enum StrategyFlag {
    BySize,
    ByLanguage,
    ByDirectory,
    #[default]
    Mixed,
}

impl StrategyFlag {
    pub(crate) const fn as_domain(self) -> BatchStrategy {
        match self {
            StrategyFlag::BySize => BatchStrategy::BySize,
            StrategyFlag::ByLanguage => BatchStrategy::ByLanguage,
            StrategyFlag::ByDirectory => BatchStrategy::ByDirectory,
            StrategyFlag::Mixed => BatchStrategy::Mixed,
        }
    }
}

impl std::fmt::Display for StrategyFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StrategyFlag::BySize => "by-size",
            StrategyFlag::ByLanguage => "by-language",
            StrategyFlag::ByDirectory => "by-directory",
            StrategyFlag::Mixed => "mixed",
        })
    }
}
