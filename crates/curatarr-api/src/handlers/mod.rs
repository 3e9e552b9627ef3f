// SPDX-License-Identifier: GPL-3.0-or-later
pub mod custom_formats;
pub mod qualities;
pub mod quality_profiles;
pub mod releases;
