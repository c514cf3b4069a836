use super::MetricContext;
use crate::error::Result;
use crate::schema::Gender;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

pub const UNDEFINED_DEPARTMENT: &str = "Undefined";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeadcountSection {
    pub total: usize,
    pub male: usize,
    pub female: usize,
    pub other: usize,
    pub departments: Vec<NamedCount>,
    pub categories: Vec<NamedCount>,
}

fn named_counts(counts: BTreeMap<String, usize>) -> Vec<NamedCount> {
    counts
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect()
}

/// Active employees of the company. Categories listed in the configuration
/// (gender-like categories by default) are not counted.
pub fn headcount(ctx: &MetricContext) -> Result<HeadcountSection> {
    let employees = ctx.store.employees(ctx.company_id)?;
    let mut section = HeadcountSection::default();
    let mut departments = BTreeMap::new();
    let mut categories = BTreeMap::new();

    for employee in employees.iter().filter(|e| e.active) {
        section.total += 1;
        match employee.gender {
            Some(Gender::Male) => section.male += 1,
            Some(Gender::Female) => section.female += 1,
            Some(Gender::Other) | None => section.other += 1,
        }

        let department = employee
            .department
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| UNDEFINED_DEPARTMENT.to_string());
        *departments.entry(department).or_insert(0) += 1;

        for category in &employee.categories {
            if ctx.config.excluded_employee_categories.contains(category) {
                continue;
            }
            *categories.entry(category.clone()).or_insert(0) += 1;
        }
    }

    debug!(
        "Headcount: {} active of {} employee(s)",
        section.total,
        employees.len()
    );

    section.departments = named_counts(departments);
    section.categories = named_counts(categories);
    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportConfig;
    use crate::currency::RateTable;
    use crate::metrics::fixtures::*;
    use crate::schema::Employee;

    fn employee(
        id: u64,
        gender: Option<Gender>,
        department: Option<&str>,
        categories: &[&str],
    ) -> Employee {
        Employee {
            id,
            name: format!("Employee {}", id),
            company_id: 1,
            active: true,
            gender,
            department: department.map(str::to_string),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            hourly_cost: None,
        }
    }

    #[test]
    fn test_headcount_breakdown() {
        let mut store = store();
        let mut retired = employee(5, Some(Gender::Male), Some("Sales"), &[]);
        retired.active = false;
        store.employees = vec![
            employee(1, Some(Gender::Male), Some("Engineering"), &["Male", "Permanent"]),
            employee(2, Some(Gender::Female), Some("Engineering"), &["Female", "Contract"]),
            employee(3, None, None, &["Permanent"]),
            employee(4, Some(Gender::Other), Some(" "), &[]),
            retired,
        ];

        let section = with_context(&store, &ReportConfig::default(), &RateTable::new(), |ctx| {
            headcount(ctx).unwrap()
        });

        assert_eq!(section.total, 4);
        assert_eq!((section.male, section.female, section.other), (1, 1, 2));
        assert_eq!(
            section.departments,
            vec![
                NamedCount { name: "Engineering".to_string(), count: 2 },
                NamedCount { name: UNDEFINED_DEPARTMENT.to_string(), count: 2 },
            ]
        );
        assert_eq!(
            section.categories,
            vec![
                NamedCount { name: "Contract".to_string(), count: 1 },
                NamedCount { name: "Permanent".to_string(), count: 2 },
            ]
        );
    }

    #[test]
    fn test_empty_company() {
        let section = with_context(&store(), &ReportConfig::default(), &RateTable::new(), |ctx| {
            headcount(ctx).unwrap()
        });
        assert_eq!(section, HeadcountSection::default());
    }
}
