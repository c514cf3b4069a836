use crate::config::{DualTagPolicy, ReportConfig};
use crate::distribution::{DistributionResolver, ResolvedDistribution};
use crate::error::{DataQualityIssue, ReportError, Result};
use crate::schema::{AnalyticAccountId, CommercialRecord, Project, ProjectId, RecordLine};
use crate::store::ProjectDirectory;
use crate::utils::round2;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub enum Region {
    Local,
    Export,
    Other,
    Mixed,
    Unclassified,
}

impl Region {
    /// The aggregate bucket an amount in this region lands in. Aggregates only
    /// know Local, Export and Other.
    pub fn bucket(self) -> Region {
        match self {
            Region::Local => Region::Local,
            Region::Export => Region::Export,
            Region::Other | Region::Mixed | Region::Unclassified => Region::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Region::Local => "Local",
            Region::Export => "Export",
            Region::Other => "Other",
            Region::Mixed => "Mixed",
            Region::Unclassified => "Unclassified",
        }
    }
}

/// Row-level restriction requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegionFilter {
    #[default]
    All,
    Local,
    Export,
}

impl RegionFilter {
    pub fn admits(&self, region: Region) -> bool {
        match self {
            RegionFilter::All => true,
            RegionFilter::Local => region == Region::Local,
            RegionFilter::Export => region == Region::Export,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegionFilter::All => "all",
            RegionFilter::Local => "local",
            RegionFilter::Export => "export",
        }
    }
}

/// Running Local/Export/Other split. Mixed and Unclassified fold into Other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RegionAmounts {
    pub local: f64,
    pub export: f64,
    pub other: f64,
}

impl RegionAmounts {
    pub fn add(&mut self, region: Region, amount: f64) {
        match region.bucket() {
            Region::Local => self.local += amount,
            Region::Export => self.export += amount,
            _ => self.other += amount,
        }
    }

    pub fn get(&self, region: Region) -> f64 {
        match region.bucket() {
            Region::Local => self.local,
            Region::Export => self.export,
            _ => self.other,
        }
    }

    pub fn total(&self) -> f64 {
        self.local + self.export + self.other
    }

    pub fn merge(&mut self, other: &RegionAmounts) {
        self.local += other.local;
        self.export += other.export;
        self.other += other.other;
    }

    pub fn rounded(&self) -> RegionAmounts {
        RegionAmounts {
            local: round2(self.local),
            export: round2(self.export),
            other: round2(self.other),
        }
    }

    pub fn scaled(&self, factor: f64) -> RegionAmounts {
        RegionAmounts {
            local: self.local * factor,
            export: self.export * factor,
            other: self.other * factor,
        }
    }
}

/// Which projects are Local or Export, keyed by project and by analytic
/// account. Built once per request from the project directory.
#[derive(Debug, Clone, Default)]
pub struct RegionIndex {
    projects: HashMap<ProjectId, Project>,
    regions: HashMap<ProjectId, Region>,
    accounts: HashMap<AnalyticAccountId, ProjectId>,
    local_tag: String,
    export_tag: String,
    missing_tags: Vec<String>,
}

impl RegionIndex {
    /// An index where nothing is tagged. Every amount lands in Other.
    pub fn empty(config: &ReportConfig) -> Self {
        Self {
            local_tag: config.local_tag.clone(),
            export_tag: config.export_tag.clone(),
            missing_tags: vec![config.local_tag.clone(), config.export_tag.clone()],
            ..Default::default()
        }
    }

    /// Loads the project universe. Missing region tags are not an error here;
    /// they are remembered so calculators that need them can refuse via
    /// [`RegionIndex::require_tags`].
    pub fn load(directory: &dyn ProjectDirectory, config: &ReportConfig) -> Result<Self> {
        let mut index = Self {
            local_tag: config.local_tag.clone(),
            export_tag: config.export_tag.clone(),
            ..Default::default()
        };

        let local_ids = index.tagged_projects(directory, &config.local_tag)?;
        let export_ids = index.tagged_projects(directory, &config.export_tag)?;

        for project in directory.projects()? {
            index.projects.entry(project.id).or_insert(project);
        }

        let mut dual = 0usize;
        for (id, project) in &index.projects {
            let region = match (local_ids.contains(id), export_ids.contains(id)) {
                (true, true) => {
                    dual += 1;
                    match config.dual_tag_policy {
                        DualTagPolicy::PreferLocal => Region::Local,
                        DualTagPolicy::PreferExport => Region::Export,
                        DualTagPolicy::Mixed => Region::Mixed,
                    }
                }
                (true, false) => Region::Local,
                (false, true) => Region::Export,
                (false, false) => Region::Other,
            };
            index.regions.insert(*id, region);

            if let Some(account) = directory.analytic_account_of(project) {
                index.accounts.insert(account, *id);
            }
        }

        if dual > 0 {
            debug!(
                "{} project(s) carry both region tags, resolved with {:?}",
                dual, config.dual_tag_policy
            );
        }
        debug!(
            "Region index: {} projects, {} local, {} export, {} analytic accounts",
            index.projects.len(),
            local_ids.len(),
            export_ids.len(),
            index.accounts.len()
        );

        Ok(index)
    }

    fn tagged_projects(
        &mut self,
        directory: &dyn ProjectDirectory,
        tag_name: &str,
    ) -> Result<HashSet<ProjectId>> {
        let Some(tag) = directory.find_tag(tag_name)? else {
            warn!("Project tag '{}' not found, its region stays empty", tag_name);
            self.missing_tags.push(tag_name.to_string());
            return Ok(HashSet::new());
        };

        let mut ids = HashSet::new();
        for project in directory.projects_with_tag(tag)? {
            ids.insert(project.id);
            self.projects.entry(project.id).or_insert(project);
        }
        Ok(ids)
    }

    pub fn require_tags(&self) -> Result<()> {
        match self.missing_tags.first() {
            Some(tag) => Err(ReportError::MissingRegionTag(tag.clone())),
            None => Ok(()),
        }
    }

    pub fn missing_tag_issues(&self) -> Vec<DataQualityIssue> {
        self.missing_tags
            .iter()
            .map(|tag| DataQualityIssue::MissingTagConfiguration { tag: tag.clone() })
            .collect()
    }

    pub fn region_of(&self, project_id: ProjectId) -> Region {
        self.regions
            .get(&project_id)
            .copied()
            .unwrap_or(Region::Other)
    }

    pub fn project(&self, project_id: ProjectId) -> Option<&Project> {
        self.projects.get(&project_id)
    }

    pub fn project_for_account(&self, account: AnalyticAccountId) -> Option<&Project> {
        self.accounts
            .get(&account)
            .and_then(|id| self.projects.get(id))
    }

    pub fn account_of(&self, project_id: ProjectId) -> Option<AnalyticAccountId> {
        self.projects
            .get(&project_id)
            .and_then(|p| p.analytic_account_id)
    }

    /// The configured region tags this project carries.
    pub fn region_tags(&self, project_id: ProjectId) -> Vec<String> {
        let Some(project) = self.projects.get(&project_id) else {
            return Vec::new();
        };
        [&self.local_tag, &self.export_tag]
            .into_iter()
            .filter(|tag| project.has_tag(tag))
            .cloned()
            .collect()
    }
}

/// A share of a record's amount attributed to one region (and project, when
/// one was matched). Amounts are in document currency and carry the refund
/// sign.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub region: Region,
    pub project_id: Option<ProjectId>,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub region: Region,
    pub tags: Vec<String>,
    pub project_id: Option<ProjectId>,
    pub project_name: Option<String>,
    pub allocations: Vec<Allocation>,
    pub issues: Vec<DataQualityIssue>,
    pub strategy: &'static str,
}

impl Classification {
    pub fn total(&self) -> f64 {
        self.allocations.iter().map(|a| a.amount).sum()
    }

    pub fn split(&self) -> RegionAmounts {
        let mut amounts = RegionAmounts::default();
        for allocation in &self.allocations {
            amounts.add(allocation.region, allocation.amount);
        }
        amounts
    }

    /// Amount attributed to one project.
    pub fn amount_for_project(&self, project_id: ProjectId) -> f64 {
        self.allocations
            .iter()
            .filter(|a| a.project_id == Some(project_id))
            .map(|a| a.amount)
            .sum()
    }
}

/// Everything a resolution strategy may look at.
pub struct ResolveContext<'a> {
    pub index: &'a RegionIndex,
    pub distributions: &'a DistributionResolver,
}

/// One way of attributing a record to projects. Strategies are tried in order
/// and the first that returns a classification wins.
pub trait ProjectResolver {
    fn name(&self) -> &'static str;

    fn resolve(&self, record: &CommercialRecord, ctx: &ResolveContext) -> Option<Classification>;
}

/// The record names its project(s) directly. Only the first one is used, for
/// the whole amount.
pub struct DirectProjectLink;

impl ProjectResolver for DirectProjectLink {
    fn name(&self) -> &'static str {
        "direct_project"
    }

    fn resolve(&self, record: &CommercialRecord, ctx: &ResolveContext) -> Option<Classification> {
        let project_id = *record.project_ids.first()?;
        let region = ctx.index.region_of(project_id);
        let project_name = ctx.index.project(project_id).map(|p| p.name.clone());

        Some(Classification {
            region,
            tags: ctx.index.region_tags(project_id),
            project_id: Some(project_id),
            project_name,
            allocations: vec![Allocation {
                region,
                project_id: Some(project_id),
                amount: record.signed_untaxed_total(),
            }],
            issues: Vec::new(),
            strategy: self.name(),
        })
    }
}

/// Splits each line across the projects behind its analytic accounts in
/// proportion to the distribution shares.
pub struct LineDistribution;

impl ProjectResolver for LineDistribution {
    fn name(&self) -> &'static str {
        "analytic_distribution"
    }

    fn resolve(&self, record: &CommercialRecord, ctx: &ResolveContext) -> Option<Classification> {
        let lines_total: f64 = record.lines.iter().map(|l| l.subtotal).sum();
        if lines_total == 0.0 {
            return None;
        }

        let mut issues = Vec::new();
        let resolved: Vec<(&RecordLine, ResolvedDistribution)> = record
            .lines
            .iter()
            .map(|line| match ctx.distributions.resolve_line(record.id, line) {
                Ok(distribution) => (line, distribution),
                Err(issue) => {
                    issues.push(issue);
                    (line, ResolvedDistribution::empty())
                }
            })
            .collect();

        // Empty or unreadable mappings count as no distribution at all.
        if resolved.iter().all(|(_, distribution)| distribution.is_empty()) {
            return Some(WholeAmountFallback::unclassified(record, issues));
        }

        let sign = record.kind.sign();
        let mut allocations = Vec::new();
        let mut matched_regions = BTreeSet::new();
        let mut matched_projects: Vec<ProjectId> = Vec::new();

        for (line, distribution) in &resolved {
            let amount = line.subtotal * sign;
            for (account, share) in distribution.iter() {
                match ctx.index.project_for_account(account) {
                    Some(project) => {
                        let region = ctx.index.region_of(project.id);
                        if region != Region::Other {
                            matched_regions.insert(region);
                        }
                        if !matched_projects.contains(&project.id) {
                            matched_projects.push(project.id);
                        }
                        allocations.push(Allocation {
                            region,
                            project_id: Some(project.id),
                            amount: amount * share,
                        });
                    }
                    None => allocations.push(Allocation {
                        region: Region::Other,
                        project_id: None,
                        amount: amount * share,
                    }),
                }
            }

            let remainder = distribution.unattributed_share();
            if remainder > 0.0 {
                allocations.push(Allocation {
                    region: Region::Other,
                    project_id: None,
                    amount: amount * remainder,
                });
            }
        }

        let region = match matched_regions.len() {
            0 => Region::Other,
            1 => matched_regions.iter().next().copied().unwrap_or(Region::Other),
            _ => Region::Mixed,
        };

        let mut tags: Vec<String> = Vec::new();
        for project_id in &matched_projects {
            for tag in ctx.index.region_tags(*project_id) {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }

        let project_id = matched_projects.first().copied();
        let project_name = project_id
            .and_then(|id| ctx.index.project(id))
            .map(|p| p.name.clone());

        Some(Classification {
            region,
            tags,
            project_id,
            project_name,
            allocations,
            issues,
            strategy: self.name(),
        })
    }
}

/// Nothing links the record to a project: the whole amount is unclassified.
pub struct WholeAmountFallback;

impl ProjectResolver for WholeAmountFallback {
    fn name(&self) -> &'static str {
        "unclassified"
    }

    fn resolve(&self, record: &CommercialRecord, _ctx: &ResolveContext) -> Option<Classification> {
        Some(Self::unclassified(record, Vec::new()))
    }
}

impl WholeAmountFallback {
    fn unclassified(record: &CommercialRecord, issues: Vec<DataQualityIssue>) -> Classification {
        Classification {
            region: Region::Unclassified,
            tags: Vec::new(),
            project_id: None,
            project_name: None,
            allocations: vec![Allocation {
                region: Region::Unclassified,
                project_id: None,
                amount: record.signed_untaxed_total(),
            }],
            issues,
            strategy: WholeAmountFallback.name(),
        }
    }
}

pub struct RegionClassifier<'a> {
    index: &'a RegionIndex,
    distributions: DistributionResolver,
    chain: Vec<Box<dyn ProjectResolver>>,
}

impl<'a> RegionClassifier<'a> {
    pub fn new(index: &'a RegionIndex, config: &ReportConfig) -> Self {
        Self {
            index,
            distributions: DistributionResolver::new(config.percentage_threshold),
            chain: vec![
                Box::new(DirectProjectLink),
                Box::new(LineDistribution),
                Box::new(WholeAmountFallback),
            ],
        }
    }

    pub fn index(&self) -> &RegionIndex {
        self.index
    }

    pub fn distributions(&self) -> &DistributionResolver {
        &self.distributions
    }

    pub fn classify(&self, record: &CommercialRecord) -> Classification {
        let ctx = ResolveContext {
            index: self.index,
            distributions: &self.distributions,
        };

        for strategy in &self.chain {
            if let Some(classification) = strategy.resolve(record, &ctx) {
                return classification;
            }
        }

        // The chain always ends with the whole-amount fallback.
        WholeAmountFallback
            .resolve(record, &ctx)
            .unwrap_or_else(|| Classification {
                region: Region::Unclassified,
                tags: Vec::new(),
                project_id: None,
                project_name: None,
                allocations: Vec::new(),
                issues: Vec::new(),
                strategy: "none",
            })
    }
}
