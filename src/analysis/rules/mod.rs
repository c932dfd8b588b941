pub mod statements;

use super::{Finding, ReportContext};

pub trait Rule: Send + Sync {
    fn id(&self) -> &'static str;
    fn evaluate(&self, ctx: &ReportContext) -> Vec<Finding>;
}

pub fn all_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(statements::SeqScanSlowQueriesRule),
        Box::new(statements::IndexImprovementsRule),
        Box::new(statements::QueryRefactoringRule),
        Box::new(statements::SortWithoutIndexRule),
        Box::new(statements::JoinMissingIndexesRule),
    ]
}
