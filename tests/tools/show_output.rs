use shift_rotation_lib::application::dto::MonthlyScheduleResult;
use shift_rotation_lib::domain::models::ScheduleStats;

pub fn show_monthly_schedule_debug_data(result: &MonthlyScheduleResult) {
    println!("\n=======================================================");
    println!("[DEBUG] schedule {}-{:02} ({} people)", result.year, result.month, result.people.len());
    println!("=======================================================");

    for entry in &result.people {
        let line: String = entry.days.iter().map(|d| d.shift_code.as_str()).collect::<Vec<_>>().join(" ");
        println!("   {:<6} [{}] {}", entry.person.code, entry.person.group, line);
    }
    println!("=======================================================\n");
}

pub fn show_stats_debug_data(stats: &ScheduleStats) {
    println!("\n[DEBUG] active people: {}", stats.total_active_people);
    for (code, count) in &stats.counts_by_shift_code {
        println!("   shift {:<2}: {}", code.as_str(), count);
    }
    for (group, count) in &stats.counts_by_group {
        println!("   group {:<2}: {} worked", group.as_str(), count);
    }
}
