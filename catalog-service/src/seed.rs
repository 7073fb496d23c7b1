use anyhow::{anyhow, Context, Result};
use sqlx::{Postgres, Transaction};
use tracing::info;

use crate::movie_handlers::{self, MediaType, NewMedia, NewMovie};

pub struct StarterMedia {
    pub file_url: &'static str,
    pub alt_name: &'static str,
    pub is_banner: bool,
    pub media_type: MediaType,
}

pub struct StarterMovie {
    pub title: &'static str,
    pub description: &'static str,
    pub rating: f64,
    pub release_date: &'static str,
    pub media: &'static [StarterMedia],
}

/// Starter catalog granted to a brand-new group on its first admin
/// registration. Fixed and non-configurable.
pub const STARTER_CATALOG: &[StarterMovie] = &[
    StarterMovie {
        title: "Laskar Pelangi",
        description: "Laskar Pelangi adalah sebuah film drama Indonesia tahun 2008 yang disutradarai oleh Riri Riza dari skenario yang ditulis oleh Salman Aristo bersama Riri dan Mira Lesmana berdasarkan novel berjudul sama karya Andrea Hirata. Film ini diproduksi oleh Miles Films bersama Mizan Productions dan SinemArt.",
        rating: 5.0,
        release_date: "2008-09-25 00:00:00.000",
        media: &[
            StarterMedia {
                file_url: "https://upload.wikimedia.org/wikipedia/id/1/17/Laskar_Pelangi_film.jpg",
                alt_name: "Cover laskar pelangi",
                is_banner: true,
                media_type: MediaType::Photo,
            },
            StarterMedia {
                file_url: "https://www.youtube.com/embed/8ZYOqARRTng?si=6gA5MCx-DwK6WeB0",
                alt_name: "Trailer laskar pelangi",
                is_banner: false,
                media_type: MediaType::Video,
            },
        ],
    },
    StarterMovie {
        title: "KKN di Desa Penari",
        description: "KKN di Desa Penari (Hanacaraka: ꦏ꧀ꦏ꧀ꦤ꧀ꦝꦶꦣꦺꦱꦥꦼꦤꦫꦶ) adalah film hantu Indonesia tahun 2022 yang disutradarai oleh Awi Suryadi berdasarkan cerita viral berjudul sama karya SimpleMan. Film produksi MD Pictures serta Pichouse Films ini dibintangi oleh Tissa Biani, Adinda Thomas, dan Achmad Megantara. KKN di Desa Penari tayang perdana di bioskop Indonesia pada 30 April 2022. Film ini sempat dijadwalkan akan tayang pada 19 Maret 2020 dan 24 Februari 2022. Namun, keduanya dibatalkan karena pandemi Covid-19.",
        rating: 4.8,
        release_date: "2022-04-30 00:00:00.000",
        media: &[
            StarterMedia {
                file_url: "https://upload.wikimedia.org/wikipedia/id/b/b7/KKN_di_Desa_Penari.jpg",
                alt_name: "Cover KKN Di Desa Penari",
                is_banner: true,
                media_type: MediaType::Photo,
            },
            StarterMedia {
                file_url: "https://www.youtube.com/embed/PAMx9m4Z2V4?si=qBitPYPvNhITKEEz",
                alt_name: "Trailer KKN Di Desa Penari",
                is_banner: false,
                media_type: MediaType::Video,
            },
        ],
    },
    StarterMovie {
        title: "Avengers: Endgame",
        description: "Avengers: Endgame adalah film pahlawan super Amerika tahun 2019 yang berdasarkan kisah tim pahlawan super Avengers dari Marvel Comics. Film yang diproduksi oleh Marvel Studios dan didistribusikan oleh Walt Disney Studios Motion Pictures ini adalah sekuel langsung Avengers: Infinity War (2018) dan merupakan film ke-22 Marvel Cinematic Universe (MCU). Film ini disutradarai oleh Anthony dan Joe Russo dan ditulis oleh Christopher Markus dan Stephen McFeely, dan menampilkan pemeran ensambel di antaranya Robert Downey Jr., Chris Evans, Mark Ruffalo, Chris Hemsworth, Scarlett Johansson, Jeremy Renner, Don Cheadle, Paul Rudd, Brie Larson, Karen Gillan, Danai Gurira, Benedict Wong, Jon Favreau, Bradley Cooper, Gwyneth Paltrow, dan Josh Brolin. Pada film ini, anggota Avengers yang masih hidup dan para sekutunya berusaha untuk membalikkan kerusakan yang disebabkan oleh Thanos dalam Infinity War.",
        rating: 4.5,
        release_date: "2019-04-26 00:00:00.000",
        media: &[
            StarterMedia {
                file_url: "https://upload.wikimedia.org/wikipedia/id/0/0d/Avengers_Endgame_poster.jpg",
                alt_name: "Cover Avengers Endgame",
                is_banner: true,
                media_type: MediaType::Photo,
            },
            StarterMedia {
                file_url: "https://www.youtube.com/embed/TcMBFSGVi1c?si=BaIseKf4Ot79eYL9",
                alt_name: "Trailer Avengers Endgame",
                is_banner: false,
                media_type: MediaType::Video,
            },
        ],
    },
];

/// Seed the starter catalog into a group, at most once per group.
///
/// Runs on the caller's transaction. The seed marker row carries the
/// once-only guarantee: concurrent first registrations race on the marker's
/// primary key, so exactly one of them inserts the catalog and the others
/// observe a conflict and skip. Returns whether this call seeded.
pub async fn seed_group_if_empty(
    tx: &mut Transaction<'_, Postgres>,
    group_id: i64,
) -> Result<bool> {
    let claimed = sqlx::query(
        "INSERT INTO group_catalog_seeds (group_id) VALUES ($1) ON CONFLICT (group_id) DO NOTHING",
    )
    .bind(group_id)
    .execute(&mut **tx)
    .await
    .context("Failed to claim catalog seed marker")?
    .rows_affected();

    if claimed == 0 {
        return Ok(false);
    }

    let movies: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies WHERE group_id = $1")
        .bind(group_id)
        .fetch_one(&mut **tx)
        .await
        .context("Failed to count group movies before seeding")?;
    if movies != 0 {
        return Ok(false);
    }

    for starter in STARTER_CATALOG {
        let movie = NewMovie::try_from(starter)?;
        movie_handlers::insert_movie(tx, group_id, &movie)
            .await
            .with_context(|| format!("Failed to seed starter movie '{}'", starter.title))?;
    }

    info!(group_id, "seeded starter catalog");
    Ok(true)
}

impl TryFrom<&StarterMovie> for NewMovie {
    type Error = anyhow::Error;

    fn try_from(starter: &StarterMovie) -> Result<Self> {
        let release_date = movie_handlers::parse_release_date(starter.release_date)
            .ok_or_else(|| anyhow!("Invalid starter release date '{}'", starter.release_date))?;

        Ok(NewMovie {
            title: starter.title.to_string(),
            description: Some(starter.description.to_string()),
            rating: starter.rating,
            release_date,
            media: starter
                .media
                .iter()
                .map(|media| NewMedia {
                    file_url: media.file_url.to_string(),
                    alt_name: Some(media.alt_name.to_string()),
                    is_banner: media.is_banner,
                    media_type: media.media_type,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_catalog_has_three_entries() {
        assert_eq!(STARTER_CATALOG.len(), 3);
    }

    #[test]
    fn starter_entries_satisfy_catalog_invariants() {
        for starter in STARTER_CATALOG {
            assert!(!starter.title.is_empty());
            assert!(starter.title.len() <= 191);
            assert!((0.0..=5.0).contains(&starter.rating));
            assert!(!starter.media.is_empty() && starter.media.len() <= 5);

            let banners = starter
                .media
                .iter()
                .filter(|media| media.is_banner && media.media_type == MediaType::Photo)
                .count();
            assert_eq!(banners, 1, "'{}' needs exactly one banner photo", starter.title);
        }
    }

    #[test]
    fn starter_entries_convert_to_persistable_movies() {
        for starter in STARTER_CATALOG {
            let movie = NewMovie::try_from(starter).expect("starter entry converts");
            assert_eq!(movie.media.len(), starter.media.len());
        }
    }
}
