//! CSV export of a planned run.

use crate::error::Result;
use crate::planner::SyncPlan;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
struct AssignmentRecord<'a> {
    monster_id: i32,
    group_id: i32,
    group_name: &'a str,
    drop_ratio: f64,
    drop_amount_min: i32,
    drop_amount_max: i32,
}

#[derive(Debug, Serialize)]
struct GroupRecord<'a> {
    group_id: i32,
    group_name: &'a str,
    category: &'static str,
    item_id: i32,
    select_ratio: f64,
}

/// Write one CSV row per planned assignment, with a header.
pub fn write_assignments_csv<W: Write>(plan: &SyncPlan, writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for assignment in &plan.assignments {
        csv_writer.serialize(AssignmentRecord {
            monster_id: assignment.monster_id,
            group_id: assignment.group_id,
            group_name: &assignment.group_name,
            drop_ratio: assignment.drop_ratio,
            drop_amount_min: assignment.drop_amount_min,
            drop_amount_max: assignment.drop_amount_max,
        })?;
    }
    csv_writer.flush()?;
    Ok(plan.assignments.len())
}

/// Write one CSV row per planned group member, with a header.
pub fn write_groups_csv<W: Write>(plan: &SyncPlan, writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for group in &plan.groups {
        for member in &group.members {
            csv_writer.serialize(GroupRecord {
                group_id: group.id,
                group_name: &group.name,
                category: group.category.label(),
                item_id: member.item_id,
                select_ratio: member.select_ratio,
            })?;
        }
    }
    csv_writer.flush()?;
    Ok(plan.group_rows())
}

/// Export planned assignments to `path`, creating or truncating it.
pub fn export_assignments(plan: &SyncPlan, path: &Path) -> Result<usize> {
    let file = std::fs::File::create(path)?;
    let rows = write_assignments_csv(plan, file)?;
    tracing::info!("Exported {} planned assignments to {:?}", rows, path);
    Ok(rows)
}

pub fn export_groups(plan: &SyncPlan, path: &Path) -> Result<usize> {
    let file = std::fs::File::create(path)?;
    let rows = write_groups_csv(plan, file)?;
    tracing::info!("Exported {} planned group rows to {:?}", rows, path);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Assignment, DropGroup, RareCategory};

    fn sample_plan() -> SyncPlan {
        let group = DropGroup::equal_split(12, "RARE_A_MOB_1".to_string(), RareCategory::Star, &[100, 101]);
        let assignment = Assignment::new(1, &group, 0.05);
        SyncPlan { items_processed: 2, groups: vec![group], assignments: vec![assignment] }
    }

    #[test]
    fn test_assignment_csv_layout() {
        let mut out = Vec::new();
        let rows = write_assignments_csv(&sample_plan(), &mut out).unwrap();
        assert_eq!(rows, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "monster_id,group_id,group_name,drop_ratio,drop_amount_min,drop_amount_max\n\
             1,12,RARE_A_MOB_1,0.05,1,1\n"
        );
    }

    #[test]
    fn test_group_csv_expands_members() {
        let mut out = Vec::new();
        let rows = write_groups_csv(&sample_plan(), &mut out).unwrap();
        assert_eq!(rows, 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "group_id,group_name,category,item_id,select_ratio");
        assert_eq!(lines[1], "12,RARE_A_MOB_1,Seal of Star,100,0.5");
        assert_eq!(lines[2], "12,RARE_A_MOB_1,Seal of Star,101,0.5");
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.csv");
        assert_eq!(export_assignments(&sample_plan(), &path).unwrap(), 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("monster_id,"));
    }

    #[test]
    fn test_empty_plan_writes_nothing() {
        let mut out = Vec::new();
        assert_eq!(write_assignments_csv(&SyncPlan::default(), &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }
}
