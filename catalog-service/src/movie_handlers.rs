use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use common_auth::{ensure_role, AuthContext, Role};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::user_handlers::MessageResponse;
use crate::AppState;

/// Allowed-role sets for the catalog routes. Reads admit every authenticated
/// group member; writes are admin-only.
pub const MOVIE_READ_ROLES: &[Role] = &[];
pub const MOVIE_WRITE_ROLES: &[Role] = &[Role::Admin];

const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "PHOTO")]
    Photo,
    #[serde(rename = "VIDEO")]
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Photo => "PHOTO",
            MediaType::Video => "VIDEO",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieMediaInput {
    pub file_url: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub is_banner: bool,
    pub alt_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieInput {
    pub title: String,
    pub description: Option<String>,
    pub rating: f64,
    pub release_date: String,
    pub media: Vec<MovieMediaInput>,
}

/// A catalog entry whose invariants have been checked and whose release date
/// has been parsed, ready to persist.
#[derive(Debug)]
pub(crate) struct NewMovie {
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) rating: f64,
    pub(crate) release_date: DateTime<Utc>,
    pub(crate) media: Vec<NewMedia>,
}

#[derive(Debug)]
pub(crate) struct NewMedia {
    pub(crate) file_url: String,
    pub(crate) alt_name: Option<String>,
    pub(crate) is_banner: bool,
    pub(crate) media_type: MediaType,
}

impl TryFrom<MovieInput> for NewMovie {
    type Error = ApiError;

    fn try_from(input: MovieInput) -> Result<Self, Self::Error> {
        // Field shape is validated at the boundary; the bounds that protect
        // stored data are still enforced here, without clamping.
        if input.media.is_empty() {
            return Err(ApiError::bad_request(
                "media_required",
                "A movie must have at least one media entry",
            ));
        }
        if !(0.0..=5.0).contains(&input.rating) {
            return Err(ApiError::bad_request(
                "rating_out_of_range",
                "rating must be between 0 and 5",
            ));
        }
        let release_date = parse_release_date(&input.release_date).ok_or_else(|| {
            ApiError::bad_request("invalid_release_date", "releaseDate is not a valid date")
        })?;

        Ok(NewMovie {
            title: input.title,
            description: input.description,
            rating: input.rating,
            release_date,
            media: input
                .media
                .into_iter()
                .map(|media| NewMedia {
                    file_url: media.file_url,
                    alt_name: media.alt_name,
                    is_banner: media.is_banner,
                    media_type: media.media_type,
                })
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum OrderField {
    #[serde(rename = "title")]
    Title,
    #[serde(rename = "rating")]
    Rating,
    #[serde(rename = "releaseDate")]
    ReleaseDate,
}

impl OrderField {
    fn column(self) -> &'static str {
        match self {
            OrderField::Title => "title",
            OrderField::Rating => "rating",
            OrderField::ReleaseDate => "release_date",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum OrderDirection {
    #[serde(rename = "asc")]
    Asc,
    #[serde(rename = "desc")]
    Desc,
}

impl OrderDirection {
    fn keyword(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMoviesQuery {
    pub title: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub order_by: Option<OrderField>,
    pub order_method: OrderDirection,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_items: i64,
    pub total_pages: i64,
    pub current_page: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerMedia {
    #[serde(rename = "type")]
    pub media_type: String,
    pub file_url: String,
    pub alt_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieSummary {
    pub uid: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub rating: f64,
    pub release_date: DateTime<Utc>,
    pub media: Option<BannerMedia>,
}

#[derive(Debug, Serialize)]
pub struct MovieListResponse {
    pub pagination: Pagination,
    pub data: Vec<MovieSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub uid: Uuid,
    #[serde(rename = "type")]
    pub media_type: String,
    pub file_url: String,
    pub alt_name: Option<String>,
    pub is_banner: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieDetail {
    pub uid: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub rating: f64,
    pub release_date: DateTime<Utc>,
    pub media: Vec<MediaItem>,
}

#[derive(FromRow)]
struct MovieRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    rating: f64,
    release_date: DateTime<Utc>,
}

#[derive(FromRow)]
struct MediaRow {
    id: Uuid,
    file_url: String,
    alt_name: Option<String>,
    is_banner: bool,
    media_type: String,
}

#[derive(FromRow)]
struct BannerRow {
    movie_id: Uuid,
    media_type: String,
    file_url: String,
    alt_name: Option<String>,
}

pub async fn create_movie(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(input): Json<MovieInput>,
) -> Result<Json<MessageResponse>, ApiError> {
    ensure_role(&auth, MOVIE_WRITE_ROLES)?;
    let group_id = auth.group_id();
    let entry = NewMovie::try_from(input)?;

    let mut tx = state.db.begin().await.map_err(ApiError::internal)?;
    insert_movie(&mut tx, group_id, &entry)
        .await
        .map_err(ApiError::internal)?;
    tx.commit().await.map_err(ApiError::internal)?;

    state.metrics.catalog_write("created");

    Ok(Json(MessageResponse {
        message: "This movie was successfully created",
    }))
}

pub async fn list_movies(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListMoviesQuery>,
) -> Result<Json<MovieListResponse>, ApiError> {
    ensure_role(&auth, MOVIE_READ_ROLES)?;
    let group_id = auth.group_id();

    let window = page_window(query.page, query.limit);
    let pattern = query.title.as_deref().map(like_pattern);
    let order_column = query.order_by.unwrap_or(OrderField::ReleaseDate).column();
    let order_keyword = query.order_method.keyword();

    // Count and listing share one scoped predicate so the pagination header
    // can never disagree with the page contents.
    let total_items: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM movies WHERE group_id = $1 AND ($2::text IS NULL OR title ILIKE $2)",
    )
    .bind(group_id)
    .bind(pattern.as_deref())
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::internal)?;

    let list_sql = format!(
        "SELECT id, title, description, rating, release_date FROM movies \
         WHERE group_id = $1 AND ($2::text IS NULL OR title ILIKE $2) \
         ORDER BY {order_column} {order_keyword} LIMIT $3 OFFSET $4",
    );
    let rows = sqlx::query_as::<_, MovieRow>(&list_sql)
        .bind(group_id)
        .bind(pattern.as_deref())
        .bind(window.take)
        .bind(window.skip)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::internal)?;

    let mut banners = fetch_banners(&state, &rows).await?;

    let data = rows
        .into_iter()
        .map(|row| {
            let media = banners.remove(&row.id).map(|banner| BannerMedia {
                media_type: banner.media_type,
                file_url: banner.file_url,
                alt_name: banner.alt_name,
            });
            MovieSummary {
                uid: row.id,
                title: row.title,
                description: row.description,
                rating: row.rating,
                release_date: row.release_date,
                media,
            }
        })
        .collect();

    Ok(Json(MovieListResponse {
        pagination: Pagination {
            total_items,
            total_pages: total_pages(total_items, window.take),
            current_page: window.page,
        },
        data,
    }))
}

pub async fn get_movie(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(movie_id): Path<Uuid>,
) -> Result<Json<MovieDetail>, ApiError> {
    ensure_role(&auth, MOVIE_READ_ROLES)?;

    // A movie in another group is reported exactly like a missing one.
    let movie = sqlx::query_as::<_, MovieRow>(
        "SELECT id, title, description, rating, release_date FROM movies
         WHERE id = $1 AND group_id = $2",
    )
    .bind(movie_id)
    .bind(auth.group_id())
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::internal)?
    .ok_or(ApiError::MovieNotFound)?;

    let media = sqlx::query_as::<_, MediaRow>(
        "SELECT id, file_url, alt_name, is_banner, media_type FROM movie_media
         WHERE movie_id = $1",
    )
    .bind(movie.id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::internal)?;

    Ok(Json(MovieDetail {
        uid: movie.id,
        title: movie.title,
        description: movie.description,
        rating: movie.rating,
        release_date: movie.release_date,
        media: media
            .into_iter()
            .map(|row| MediaItem {
                uid: row.id,
                media_type: row.media_type,
                file_url: row.file_url,
                alt_name: row.alt_name,
                is_banner: row.is_banner,
            })
            .collect(),
    }))
}

pub async fn update_movie(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(movie_id): Path<Uuid>,
    Json(input): Json<MovieInput>,
) -> Result<Json<MessageResponse>, ApiError> {
    ensure_role(&auth, MOVIE_WRITE_ROLES)?;
    let group_id = auth.group_id();
    let entry = NewMovie::try_from(input)?;

    // Scope check, media replace, and scalar update ride one transaction: a
    // failure partway leaves the previous entry intact.
    let mut tx = state.db.begin().await.map_err(ApiError::internal)?;

    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM movies WHERE id = $1 AND group_id = $2")
            .bind(movie_id)
            .bind(group_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
    if existing.is_none() {
        return Err(ApiError::MovieNotFound);
    }

    sqlx::query(
        "UPDATE movies SET title = $1, description = $2, rating = $3, release_date = $4
         WHERE id = $5 AND group_id = $6",
    )
    .bind(&entry.title)
    .bind(entry.description.as_deref())
    .bind(entry.rating)
    .bind(entry.release_date)
    .bind(movie_id)
    .bind(group_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::internal)?;

    // Full replace: the stored media set equals exactly the supplied one.
    sqlx::query("DELETE FROM movie_media WHERE movie_id = $1")
        .bind(movie_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;
    insert_media(&mut tx, movie_id, &entry.media)
        .await
        .map_err(ApiError::internal)?;

    tx.commit().await.map_err(ApiError::internal)?;

    state.metrics.catalog_write("updated");

    Ok(Json(MessageResponse {
        message: "This movie was successfully updated",
    }))
}

pub async fn delete_movie(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(movie_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    ensure_role(&auth, MOVIE_WRITE_ROLES)?;

    // Media rows go with the movie through the cascading foreign key.
    let result = sqlx::query("DELETE FROM movies WHERE id = $1 AND group_id = $2")
        .bind(movie_id)
        .bind(auth.group_id())
        .execute(&state.db)
        .await
        .map_err(ApiError::internal)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::MovieNotFound);
    }

    state.metrics.catalog_write("deleted");

    Ok(Json(MessageResponse {
        message: "This movie was successfully removed",
    }))
}

/// Insert a movie and its media set on the caller's transaction. The two
/// writes commit or roll back together.
pub(crate) async fn insert_movie(
    tx: &mut Transaction<'_, Postgres>,
    group_id: i64,
    movie: &NewMovie,
) -> Result<Uuid, sqlx::Error> {
    let movie_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO movies (id, group_id, title, description, rating, release_date)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(movie_id)
    .bind(group_id)
    .bind(&movie.title)
    .bind(movie.description.as_deref())
    .bind(movie.rating)
    .bind(movie.release_date)
    .execute(&mut *tx)
    .await?;

    insert_media(tx, movie_id, &movie.media).await?;
    Ok(movie_id)
}

async fn insert_media(
    tx: &mut Transaction<'_, Postgres>,
    movie_id: Uuid,
    media: &[NewMedia],
) -> Result<(), sqlx::Error> {
    for item in media {
        sqlx::query(
            "INSERT INTO movie_media (id, movie_id, file_url, alt_name, is_banner, media_type)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(movie_id)
        .bind(&item.file_url)
        .bind(item.alt_name.as_deref())
        .bind(item.is_banner)
        .bind(item.media_type.as_str())
        .execute(&mut *tx)
        .await?;
    }
    Ok(())
}

async fn fetch_banners(
    state: &AppState,
    rows: &[MovieRow],
) -> Result<HashMap<Uuid, BannerRow>, ApiError> {
    if rows.is_empty() {
        return Ok(HashMap::new());
    }

    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let banners = sqlx::query_as::<_, BannerRow>(
        "SELECT DISTINCT ON (movie_id) movie_id, media_type, file_url, alt_name
         FROM movie_media
         WHERE movie_id = ANY($1) AND media_type = 'PHOTO' AND is_banner
         ORDER BY movie_id",
    )
    .bind(ids)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::internal)?;

    Ok(banners
        .into_iter()
        .map(|banner| (banner.movie_id, banner))
        .collect())
}

struct PageWindow {
    page: i64,
    take: i64,
    skip: i64,
}

fn page_window(page: Option<i64>, limit: Option<i64>) -> PageWindow {
    let page = page.unwrap_or(1);
    let take = limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
    let skip = if page > 1 { take * (page - 1) } else { 0 };
    PageWindow { page, take, skip }
}

fn total_pages(total_items: i64, limit: i64) -> i64 {
    let pages = (total_items + limit - 1) / limit;
    pages.max(1)
}

/// Substring pattern for ILIKE with the wildcard characters escaped.
fn like_pattern(title: &str) -> String {
    let escaped = title
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

pub(crate) fn parse_release_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(parsed.and_utc());
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(parsed.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}
