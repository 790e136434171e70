#[cfg(test)]
mod rotation_tests {
    use chrono::{Datelike, Duration, NaiveDate, Weekday};

    use shift_rotation_lib::domain::{
        models::{RotationGroup, ShiftCode},
        rotation::{compute_shift, compute_shift_for_code, CYCLE_LENGTH},
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry() -> NaiveDate {
        date(2025, 11, 1)
    }

    // ========================================================================
    // Standard groups
    // ========================================================================

    #[test]
    fn test_first_days_of_group_a() {
        // entry 2025-11-01
        assert_eq!(compute_shift(RotationGroup::A, entry(), date(2025, 11, 1), 0, 0), ShiftCode::First);
        assert_eq!(compute_shift(RotationGroup::A, entry(), date(2025, 11, 3), 0, 0), ShiftCode::Second);
        assert_eq!(compute_shift(RotationGroup::A, entry(), date(2025, 11, 7), 0, 0), ShiftCode::Rest);
    }

    #[test]
    fn test_standard_cycle_is_periodic() {
        let start = date(2025, 9, 15);
        for group in [RotationGroup::A, RotationGroup::B, RotationGroup::C, RotationGroup::D] {
            for offset in 0..60 {
                let day = start + Duration::days(offset);
                let later = day + Duration::days(CYCLE_LENGTH);
                assert_eq!(
                    compute_shift(group, entry(), day, 0, 0),
                    compute_shift(group, entry(), later, 0, 0),
                    "group {group} on {day}"
                );
            }
        }
    }

    #[test]
    fn test_groups_are_staggered_two_days() {
        let groups = [RotationGroup::A, RotationGroup::B, RotationGroup::C, RotationGroup::D];
        let day = date(2026, 1, 14);

        for pair in groups.windows(2) {
            // the next group is two days ahead in the same cycle
            assert_eq!(
                compute_shift(pair[1], entry(), day, 0, 0),
                compute_shift(pair[0], entry(), day + Duration::days(2), 0, 0),
            );
        }

        // on the entry date the four groups sit on four different shifts
        let shifts: Vec<ShiftCode> = groups.iter().map(|g| compute_shift(*g, entry(), entry(), 0, 0)).collect();
        assert_eq!(shifts, vec![ShiftCode::First, ShiftCode::Second, ShiftCode::Third, ShiftCode::Rest]);
    }

    #[test]
    fn test_dates_before_entry_stay_in_cycle() {
        let before = date(2025, 10, 31);
        assert_eq!(compute_shift(RotationGroup::A, entry(), before, 0, 0), ShiftCode::Rest);
        assert_eq!(compute_shift(RotationGroup::A, entry(), date(2025, 10, 25), 0, 0), ShiftCode::First);
        assert_eq!(compute_shift(RotationGroup::D, entry(), date(2020, 2, 29), 0, 0),
            compute_shift(RotationGroup::D, entry(), date(2020, 2, 29) + Duration::days(8), 0, 0));
    }

    // ========================================================================
    // Paired group
    // ========================================================================

    #[test]
    fn test_paired_members_never_share_a_weekday_shift() {
        let start = date(2025, 12, 1);
        for offset in 0..70 {
            let day = start + Duration::days(offset);
            let first = compute_shift(RotationGroup::E, entry(), day, 0, 2);
            let second = compute_shift(RotationGroup::E, entry(), day, 1, 2);

            match day.weekday() {
                Weekday::Sat | Weekday::Sun => {
                    assert_eq!(first, ShiftCode::Rest, "{day}");
                    assert_eq!(second, ShiftCode::Rest, "{day}");
                }
                _ => {
                    assert!(matches!(first, ShiftCode::First | ShiftCode::Second));
                    assert!(matches!(second, ShiftCode::First | ShiftCode::Second));
                    assert_ne!(first, second, "{day}");
                }
            }
        }
    }

    #[test]
    fn test_paired_roles_invert_with_week_parity() {
        // 2025-11-03 is the Monday of ISO week 45 (odd)
        let monday = date(2025, 11, 3);
        assert_eq!(monday.iso_week().week(), 45);

        assert_eq!(compute_shift(RotationGroup::E, entry(), monday, 0, 2), ShiftCode::First);
        assert_eq!(compute_shift(RotationGroup::E, entry(), monday + Duration::days(1), 0, 2), ShiftCode::Second);

        let next_monday = monday + Duration::days(7);
        assert_eq!(compute_shift(RotationGroup::E, entry(), next_monday, 0, 2), ShiftCode::Second);
        assert_eq!(compute_shift(RotationGroup::E, entry(), next_monday, 1, 2), ShiftCode::First);
    }

    #[test]
    fn test_paired_extra_members_alternate_by_week() {
        let monday = date(2025, 11, 3); // week 45
        assert_eq!(compute_shift(RotationGroup::E, entry(), monday, 2, 3), ShiftCode::Second);
        assert_eq!(compute_shift(RotationGroup::E, entry(), monday, 3, 4), ShiftCode::First);
        assert_eq!(compute_shift(RotationGroup::E, entry(), monday + Duration::days(7), 2, 3), ShiftCode::First);
    }

    #[test]
    fn test_paired_index_outside_roster_rests() {
        let monday = date(2025, 11, 3);
        assert_eq!(compute_shift(RotationGroup::E, entry(), monday, 0, 0), ShiftCode::Rest);
        assert_eq!(compute_shift(RotationGroup::E, entry(), monday, 2, 2), ShiftCode::Rest);
    }

    // ========================================================================
    // Raw codes
    // ========================================================================

    #[test]
    fn test_unknown_group_always_rests() {
        for offset in 0..16 {
            let day = entry() + Duration::days(offset);
            assert_eq!(compute_shift_for_code("Z", entry(), day, 0, 0), ShiftCode::Rest);
            assert_eq!(compute_shift_for_code("", entry(), day, 0, 0), ShiftCode::Rest);
        }
    }

    #[test]
    fn test_raw_code_is_normalized() {
        assert_eq!(
            compute_shift_for_code(" b ", entry(), entry(), 0, 0),
            compute_shift(RotationGroup::B, entry(), entry(), 0, 0)
        );
    }
}
